use crate::proto::{telemetry::Variant, Telemetry};

/// Power metrics lifted out of a telemetry broadcast for persistence.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerReading {
    pub voltage: Option<f64>,
    pub battery_percent: Option<f64>,
}

impl PowerReading {
    /// Extract the fleet's power-channel convention from a telemetry
    /// message.
    ///
    /// Channel 1 carries the battery bus voltage. Channel 2 carries a
    /// sensor whose voltage times 100 is what the fleet records as
    /// "battery percent" — a unit hack inherited from the deployed
    /// metering boards, preserved bit-for-bit.
    pub fn from_telemetry(telemetry: &Telemetry) -> Self {
        let Some(Variant::PowerMetrics(pm)) = &telemetry.variant else {
            return Self::default();
        };
        Self {
            voltage: pm.ch1_voltage.map(f64::from),
            battery_percent: pm.ch2_voltage.map(|v| f64::from(v) * 100.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.voltage.is_none() && self.battery_percent.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{telemetry, DeviceMetrics, PowerMetrics};

    #[test]
    fn extracts_both_channels() {
        let telemetry = Telemetry {
            time: 0,
            variant: Some(telemetry::Variant::PowerMetrics(PowerMetrics {
                ch1_voltage: Some(25.4),
                ch2_voltage: Some(0.87),
                ..Default::default()
            })),
        };
        let reading = PowerReading::from_telemetry(&telemetry);
        assert!((reading.voltage.unwrap() - 25.4).abs() < 1e-5);
        assert!((reading.battery_percent.unwrap() - 87.0).abs() < 1e-4);
    }

    #[test]
    fn missing_channels_stay_absent() {
        let telemetry = Telemetry {
            time: 0,
            variant: Some(telemetry::Variant::PowerMetrics(PowerMetrics {
                ch1_voltage: Some(12.0),
                ..Default::default()
            })),
        };
        let reading = PowerReading::from_telemetry(&telemetry);
        assert_eq!(reading.voltage, Some(12.0));
        assert_eq!(reading.battery_percent, None);
    }

    #[test]
    fn device_metrics_yield_nothing() {
        // Only the power-metrics variant feeds persistence.
        let telemetry = Telemetry {
            time: 0,
            variant: Some(telemetry::Variant::DeviceMetrics(DeviceMetrics {
                voltage: Some(3.7),
                battery_level: Some(95),
                ..Default::default()
            })),
        };
        assert!(PowerReading::from_telemetry(&telemetry).is_empty());
    }

    #[test]
    fn empty_telemetry_yields_nothing() {
        assert!(PowerReading::from_telemetry(&Telemetry::default()).is_empty());
    }
}
