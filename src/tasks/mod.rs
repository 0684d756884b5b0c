mod sweeper;

pub use sweeper::IdleSweeper;
