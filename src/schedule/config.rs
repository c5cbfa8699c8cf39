//! Schedule configuration.

/// How a [`Schedule`](crate::schedule::Schedule) applies transformations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Adding a transformation equal to one already present is a no-op
    pub skip_duplicates: bool,
    /// Check every tree invariant after each mutation
    pub validate_invariants: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            skip_duplicates: true,
            validate_invariants: cfg!(debug_assertions),
        }
    }
}

impl ScheduleConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate after every mutation, whatever the build profile.
    pub fn strict() -> Self {
        Self { validate_invariants: true, ..Default::default() }
    }

    /// Never validate; for search loops replaying many schedules.
    pub fn fast() -> Self {
        Self { validate_invariants: false, ..Default::default() }
    }

    /// Set duplicate skipping
    pub fn with_skip_duplicates(mut self, skip: bool) -> Self {
        self.skip_duplicates = skip;
        self
    }

    /// Set invariant validation
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_invariants = validate;
        self
    }
}
