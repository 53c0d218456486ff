pub mod output;
pub mod report;
pub mod scanner;

pub use output::{FolderSink, ResultSink};
pub use report::RunReport;
pub use scanner::{FolderSource, ImageSource, ScanOptions};
