mod common;
mod properties;
mod runs;
mod scenarios;
