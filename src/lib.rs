pub mod app;
pub mod config;
pub mod datafile;
pub mod menu;
pub mod motor;
pub mod params;
pub mod pattern;
pub mod plot;
pub mod radio;
pub mod scan;
