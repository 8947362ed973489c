pub const MILESTONE_SCALE: [&str; 19] = [
    "B", "F1_L1", "F1_L2", "F1_L3", "F2_L1", "F2_L2", "F2_L3", "F3_L1", "F3_L2", "F3_L3", "m1",
    "m2", "m3", "m4", "m5", "m6", "m7", "m8", "m9",
];

// Unknown codes have no ordinal and order before every known one.
pub fn ordinal(code: &str) -> Option<usize> {
    MILESTONE_SCALE.iter().position(|known| *known == code)
}

pub fn is_known(code: &str) -> bool {
    ordinal(code).is_some()
}
