pub mod clinic;

pub use clinic::{normalize_slug, ClinicService};
