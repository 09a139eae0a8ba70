//! # Readout
//!
//! Text rendering of the latest sample for the live terminal view.

use crate::telemetry::{ImuReading, Reading, TelemetrySample};

/// Width of the battery gauge in characters
const BATTERY_BAR_WIDTH: usize = 20;

/// `X: 1.50 | Y: -2.30 | Z: 9.80`
pub fn acceleration_line(imu: &ImuReading) -> String {
    format!("X: {:.2} | Y: {:.2} | Z: {:.2}", imu.ax, imu.ay, imu.az)
}

/// Battery reading as a whole percentage clamped to `0..=100`
///
/// Fractions are truncated. Non-finite readings map to 0.
pub fn battery_percent(battery: f64) -> u8 {
    if !battery.is_finite() {
        return 0;
    }
    battery.clamp(0.0, 100.0) as u8
}

/// `Battery:  76% [###############.....]`
pub fn battery_line(battery: f64) -> String {
    let percent = battery_percent(battery);
    let filled = usize::from(percent) * BATTERY_BAR_WIDTH / 100;
    format!(
        "Battery: {:>3}% [{}{}]",
        percent,
        "#".repeat(filled),
        ".".repeat(BATTERY_BAR_WIDTH - filled)
    )
}

/// One status line for a sample, prefixed with its clock time
pub fn render(sample: &TelemetrySample) -> String {
    let body = match &sample.reading {
        Reading::Imu(imu) => format!("{}  {}", acceleration_line(imu), battery_line(imu.battery)),
        Reading::Number(value) => format!("Valor: {}", value),
        Reading::Text(text) => format!("Valor: {}", text),
    };
    format!("{}  {}", sample.clock_time(), body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn imu(ax: f64, ay: f64, az: f64, battery: f64) -> ImuReading {
        ImuReading { ax, ay, az, battery }
    }

    fn at(reading: Reading) -> TelemetrySample {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 1)
            .unwrap();
        TelemetrySample::new(ts, reading)
    }

    #[test]
    fn test_acceleration_line() {
        assert_eq!(
            acceleration_line(&imu(1.5, -2.3, 9.8, 76.0)),
            "X: 1.50 | Y: -2.30 | Z: 9.80"
        );
        assert_eq!(acceleration_line(&imu(0.004, 0.0, -0.0, 0.0)), "X: 0.00 | Y: 0.00 | Z: -0.00");
    }

    #[test]
    fn test_battery_percent_clamps() {
        assert_eq!(battery_percent(76.0), 76);
        assert_eq!(battery_percent(76.9), 76);
        assert_eq!(battery_percent(-5.0), 0);
        assert_eq!(battery_percent(130.0), 100);
        assert_eq!(battery_percent(f64::NAN), 0);
        assert_eq!(battery_percent(f64::INFINITY), 0);
    }

    #[test]
    fn test_battery_line() {
        assert_eq!(battery_line(100.0), format!("Battery: 100% [{}]", "#".repeat(20)));
        assert_eq!(battery_line(0.0), format!("Battery:   0% [{}]", ".".repeat(20)));
        assert_eq!(
            battery_line(50.0),
            format!("Battery:  50% [{}{}]", "#".repeat(10), ".".repeat(10))
        );
    }

    #[test]
    fn test_render_imu_sample() {
        let line = render(&at(Reading::Imu(imu(1.5, -2.3, 9.8, 76.0))));
        assert!(line.starts_with("10:00:01  X: 1.50 | Y: -2.30 | Z: 9.80"));
        assert!(line.contains("Battery:  76%"));
    }

    #[test]
    fn test_render_generic_sample() {
        assert_eq!(render(&at(Reading::Number(3.14))), "10:00:01  Valor: 3.14");
        assert_eq!(render(&at(Reading::Text("hello".into()))), "10:00:01  Valor: hello");
    }
}
