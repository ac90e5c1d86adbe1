//! ---
//! prt_section: "04-fault-models"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Phase and symmetrical-component domain transforms."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use num_complex::Complex64;

/// The operator α = 1∠120°.
pub fn alpha() -> Complex64 {
    Complex64::from_polar(1.0, 120f64.to_radians())
}

/// `[A, B, C]` → `[0, 1, 2]`.
pub fn to_sequence(phases: [Complex64; 3]) -> [Complex64; 3] {
    let a = alpha();
    let a2 = a * a;
    let [va, vb, vc] = phases;
    [
        (va + vb + vc) / 3.0,
        (va + a * vb + a2 * vc) / 3.0,
        (va + a2 * vb + a * vc) / 3.0,
    ]
}

/// `[0, 1, 2]` → `[A, B, C]`.
pub fn to_phase(sequence: [Complex64; 3]) -> [Complex64; 3] {
    let a = alpha();
    let a2 = a * a;
    let [v0, v1, v2] = sequence;
    [v0 + v1 + v2, v0 + a2 * v1 + a * v2, v0 + a * v1 + a2 * v2]
}
