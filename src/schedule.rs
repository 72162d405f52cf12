/// Trait for experimentation schedules deciding what share of a tier's slots goes to new experiments
pub trait NewExportScheduleTrait {
    /// Fraction in [0, 1] of slots reserved for never-exported candidates
    ///
    /// # Arguments
    /// * `fraction_of_campaign_left` - Remaining share of the campaign's time, supplied by the caller
    fn fraction_that_are_new_exports(&self, fraction_of_campaign_left: f64) -> f64;

    /// Get a string representation of the schedule
    fn schedule_string(&self) -> String;
}

/// Placeholder schedule: the new-export share is the remaining campaign fraction itself
pub struct ScheduleEchoFraction;

impl NewExportScheduleTrait for ScheduleEchoFraction {
    fn fraction_that_are_new_exports(&self, fraction_of_campaign_left: f64) -> f64 {
        if fraction_of_campaign_left.is_nan() {
            return 0.0;
        }
        fraction_of_campaign_left.clamp(0.0, 1.0)
    }

    fn schedule_string(&self) -> String {
        "EchoFraction".to_string()
    }
}

/// Schedule with a fixed new-export share, regardless of campaign time
pub struct ScheduleConstant {
    fraction: f64,
}

impl ScheduleConstant {
    pub fn new(fraction: f64) -> Self {
        Self { fraction: fraction.clamp(0.0, 1.0) }
    }
}

impl NewExportScheduleTrait for ScheduleConstant {
    fn fraction_that_are_new_exports(&self, _fraction_of_campaign_left: f64) -> f64 {
        self.fraction
    }

    fn schedule_string(&self) -> String {
        format!("Constant({:.2})", self.fraction)
    }
}
