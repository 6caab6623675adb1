mod common;
mod import;
mod window;
