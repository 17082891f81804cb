mod common;
mod progress;
mod review;
