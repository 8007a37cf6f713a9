use chrono::{DateTime, Duration, Utc};

use capo_core::config::SlotConfig;
use capo_core::error::CapoError;

/// The validity interval requested for a transaction, in wall-clock terms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidityWindow {
    txn_time: Option<DateTime<Utc>>,
    duration_ms: Option<u64>,
}

impl ValidityWindow {
    /// Pin the start of the window to a specific (usually future) time
    pub fn set_future_date(&mut self, date: DateTime<Utc>) -> Result<(), CapoError> {
        if let Some(existing) = self.txn_time {
            return Err(CapoError::InvalidState(format!(
                "transaction time already set to {}; can't change it to {}",
                existing, date
            )));
        }
        if self.duration_ms.is_some() {
            return Err(CapoError::InvalidState(
                "future_date must be called before valid_for".to_string(),
            ));
        }
        self.txn_time = Some(date);
        Ok(())
    }

    /// Bound the window to `duration_ms` after its start
    pub fn set_valid_for(&mut self, duration_ms: u64) -> Result<(), CapoError> {
        if let Some(existing) = self.duration_ms {
            return Err(CapoError::InvalidState(format!(
                "validity duration already set to {}ms",
                existing
            )));
        }
        if duration_ms == 0 {
            return Err(CapoError::InvalidState(
                "validity duration must be positive".to_string(),
            ));
        }
        self.duration_ms = Some(duration_ms);
        Ok(())
    }

    pub fn txn_time(&self) -> Option<DateTime<Utc>> {
        self.txn_time
    }

    pub fn is_unbounded(&self) -> bool {
        self.txn_time.is_none() && self.duration_ms.is_none()
    }

    /// Translate the window into slots.
    ///
    /// A window with only a duration starts at `now`.
    pub fn to_slots(
        &self,
        slots: &SlotConfig,
        now: DateTime<Utc>,
    ) -> Result<(Option<u64>, Option<u64>), CapoError> {
        if self.is_unbounded() {
            return Ok((None, None));
        }
        let start = self.txn_time.unwrap_or(now);
        let from = slots.slot_at(start)?;
        let to = match self.duration_ms {
            Some(ms) => Some(slots.slot_at(start + Duration::milliseconds(ms as i64))?),
            None => None,
        };
        Ok((Some(from), to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capo_core::config::NetworkParams;

    #[test]
    fn test_future_date_twice_rejected() {
        let mut window = ValidityWindow::default();
        let date = Utc::now() + Duration::hours(1);
        window.set_future_date(date).unwrap();
        assert!(window.set_future_date(date).is_err());
    }

    #[test]
    fn test_future_date_after_valid_for_rejected() {
        let mut window = ValidityWindow::default();
        window.set_valid_for(60_000).unwrap();
        let err = window.set_future_date(Utc::now()).unwrap_err();
        assert!(err.to_string().contains("before valid_for"));
    }

    #[test]
    fn test_window_in_slots() {
        let slots = NetworkParams::preview().slot_config;
        let start = slots.time_at(5_000).unwrap();

        let mut window = ValidityWindow::default();
        window.set_future_date(start).unwrap();
        window.set_valid_for(30_000).unwrap();
        assert_eq!(
            window.to_slots(&slots, Utc::now()).unwrap(),
            (Some(5_000), Some(5_030))
        );

        let mut from_now = ValidityWindow::default();
        from_now.set_valid_for(10_000).unwrap();
        assert_eq!(
            from_now.to_slots(&slots, start).unwrap(),
            (Some(5_000), Some(5_010))
        );

        assert_eq!(
            ValidityWindow::default().to_slots(&slots, start).unwrap(),
            (None, None)
        );
    }
}
