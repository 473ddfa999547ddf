#[allow(non_snake_case)]
pub mod Examples;
#[allow(non_snake_case)]
pub mod GroupContribution;
#[allow(non_snake_case)]
pub mod Molecules;
#[allow(non_snake_case)]
pub mod Thermodynamics;
#[allow(non_snake_case)]
pub mod Utils;
pub mod cli;
pub mod settings;
