pub mod check;
pub mod demo;
