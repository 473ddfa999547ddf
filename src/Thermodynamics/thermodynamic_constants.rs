//! Physical constants and default aqueous conditions, energies in kJ/mol, temperature in K.
#![allow(non_upper_case_globals)]

/// gas constant, kJ/(mol K)
pub const R: f64 = 8.31e-3;
pub const default_T: f64 = 298.15;
pub const default_pH: f64 = 7.0;
pub const default_pMg: f64 = 14.0;
/// ionic strength, M
pub const default_I: f64 = 0.1;
/// standard concentration, M
pub const default_c0: f64 = 1.0;
/// standard Gibbs energy of formation of Mg2+, kJ/mol
pub const dG0_f_Mg: f64 = -455.3;
/// extended Debye-Hueckel parameter B, 1/sqrt(M)
pub const debye_huckel_B: f64 = 1.6;

/// RT ln(10) at temperature `T`
pub fn rt_ln10(T: f64) -> f64 {
    R * T * std::f64::consts::LN_10
}

/// temperature dependence of the Debye-Hueckel constant alpha, 1/sqrt(M)
pub fn debye_huckel_alpha(T: f64) -> f64 {
    1.10708 - 1.54508e-3 * T + 5.95584e-6 * T * T
}

/// RT alpha sqrt(I) / (1 + B sqrt(I)), multiplied by (z^2 - nH - 4 nMg) in the transform
pub fn debye_huckel(I: f64, T: f64) -> f64 {
    let sqrt_i = I.max(0.0).sqrt();
    R * T * debye_huckel_alpha(T) * sqrt_i / (1.0 + debye_huckel_B * sqrt_i)
}
