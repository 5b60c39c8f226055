pub use cards::*;
pub use config::*;
pub use observer::*;
pub use oracle::*;
pub use visualization::*;

#[cfg(test)]
mod arbitrary;
mod cards;
mod config;
mod observer;
mod oracle;
mod visualization;
