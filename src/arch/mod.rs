pub mod dirconv;
