//! Parental time limit shown as a time of day
//!
//! The device stores the limit in seconds. It is presented as the clock time that many
//! seconds after midnight, wrapping past 24 hours.

use super::{Entity, EntityDescription};
use crate::bridge::DeviceControl;
use crate::error::BridgeResult;
use chrono::{NaiveTime, Timelike};
use serde_json::{json, Value};
use std::sync::Arc;

const SECONDS_PER_DAY: i64 = 86_400;

const DESCRIPTION: EntityDescription = EntityDescription {
    key: "parental_limit",
    name: "Parental Limit",
    icon: Some("mdi:timer-stop"),
    unit: None,
};

pub fn seconds_to_time(seconds: i64) -> Option<NaiveTime> {
    let wrapped = u32::try_from(seconds.rem_euclid(SECONDS_PER_DAY)).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(wrapped, 0)
}

pub fn time_to_seconds(time: NaiveTime) -> i64 {
    i64::from((time.hour() * 60 + time.minute()) * 60 + time.second())
}

pub struct ParentalLimitTime {
    control: Arc<dyn DeviceControl>,
}

impl ParentalLimitTime {
    pub fn new(control: Arc<dyn DeviceControl>) -> Self {
        Self { control }
    }

    pub fn native_value(&self) -> Option<NaiveTime> {
        seconds_to_time(self.control.snapshot()?.characteristics?.parental_limit?)
    }

    pub async fn set_value(&self, value: NaiveTime) -> BridgeResult<()> {
        self.control
            .send_command("Parental_Limit", Some(json!(time_to_seconds(value))))
            .await
    }
}

impl Entity for ParentalLimitTime {
    fn description(&self) -> &EntityDescription {
        &DESCRIPTION
    }

    fn control(&self) -> &dyn DeviceControl {
        self.control.as_ref()
    }

    fn state(&self) -> Option<Value> {
        self.native_value()
            .map(|time| json!(time.format("%H:%M:%S").to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::test_support::started_session;

    fn hms(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_seconds_conversion() {
        assert_eq!(seconds_to_time(0), Some(hms(0, 0, 0)));
        assert_eq!(seconds_to_time(900), Some(hms(0, 15, 0)));
        assert_eq!(seconds_to_time(3725), Some(hms(1, 2, 5)));
        assert_eq!(seconds_to_time(SECONDS_PER_DAY + 60), Some(hms(0, 1, 0)));
        assert_eq!(time_to_seconds(hms(1, 2, 5)), 3725);
    }

    #[tokio::test]
    async fn test_reads_and_writes_limit() {
        let (transport, session) = started_session().await;
        let limit = ParentalLimitTime::new(session);
        assert_eq!(limit.native_value(), Some(hms(0, 15, 0)));
        assert_eq!(limit.state(), Some(json!("00:15:00")));

        limit.set_value(hms(0, 20, 30)).await.unwrap();

        assert_eq!(transport.published()[0].value, Some(json!(1230)));
        assert_eq!(limit.native_value(), Some(hms(0, 20, 30)));
    }
}
