pub const DEFAULT_MULTILATERATION_COUNT: usize = 10;
pub const MS_PER_SEC: f64 = 1000.0;
