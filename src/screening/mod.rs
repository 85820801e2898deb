pub mod annual_line;
pub mod detector;
pub mod scanner;

pub use detector::BandFilter;
pub use scanner::Scanner;
