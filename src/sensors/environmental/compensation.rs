// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Floating-point compensation of BME688 ADC codes
//!
//! Every function here is pure. `t_fine` is produced by the temperature step
//! and has to be handed to the pressure and humidity steps of the same frame.

use super::CalibrationCoefficients;

/// Returns `(temperature °C, t_fine)`
pub fn compensate_temperature(adc_t: u32, calib: &CalibrationCoefficients) -> (f32, f64) {
    let adc = adc_t as f64;
    let t1 = calib.t1 as f64;

    let var1 = (adc / 16384.0 - t1 / 1024.0) * calib.t2 as f64;
    let d = adc / 131072.0 - t1 / 8192.0;
    let var2 = d * d * (calib.t3 as f64 * 16.0);

    let t_fine = var1 + var2;
    ((t_fine / 5120.0) as f32, t_fine)
}

/// Pressure in Pa. Returns exactly `0.0` when the scaling denominator is zero.
pub fn compensate_pressure(adc_p: u32, calib: &CalibrationCoefficients, t_fine: f64) -> f32 {
    let mut var1 = t_fine / 2.0 - 64000.0;
    let mut var2 = var1 * var1 * (calib.p6 as f64 / 131072.0);
    var2 += var1 * calib.p5 as f64 * 2.0;
    var2 = var2 / 4.0 + calib.p4 as f64 * 65536.0;
    var1 = (calib.p3 as f64 * var1 * var1 / 16384.0 + calib.p2 as f64 * var1) / 524288.0;
    var1 = (1.0 + var1 / 32768.0) * calib.p1 as f64;

    if var1 == 0.0 {
        return 0.0;
    }

    let mut p = 1048576.0 - adc_p as f64;
    p = ((p - var2 / 4096.0) * 6250.0) / var1;
    let var1 = calib.p9 as f64 * p * p / 2147483648.0;
    let var2 = p * calib.p8 as f64 / 32768.0;
    let p256 = p / 256.0;
    let var3 = p256 * p256 * p256 * (calib.p10 as f64 / 131072.0);

    (p + (var1 + var2 + var3 + calib.p7 as f64 * 128.0) / 16.0) as f32
}

/// Relative humidity in %, clamped to 0..=100
pub fn compensate_humidity(adc_h: u16, calib: &CalibrationCoefficients, t_fine: f64) -> f32 {
    let temp_comp = t_fine / 5120.0;

    let var1 = adc_h as f64 - (calib.h1 as f64 * 16.0 + (calib.h3 as f64 / 2.0) * temp_comp);
    let var2 = var1
        * ((calib.h2 as f64 / 262144.0)
            * (1.0
                + (calib.h4 as f64 / 16384.0) * temp_comp
                + (calib.h5 as f64 / 1048576.0) * temp_comp * temp_comp));
    let var3 = calib.h6 as f64 / 16384.0;
    let var4 = calib.h7 as f64 / 2097152.0;

    let hum = var2 + (var3 + var4 * temp_comp) * var2 * var2;
    hum.clamp(0.0, 100.0) as f32
}

/// Approximate gas resistance in ohms.
///
/// This is a monotonic inverse of the ADC code, good for watching relative
/// change. It is not the range-table formula from the datasheet.
pub fn estimate_gas_resistance(adc_g: u16) -> f32 {
    if adc_g == 0 {
        return 0.0;
    }
    (1.0e6 / adc_g as f64) as f32
}

/// Heater resistance register value for a target plate temperature
pub fn heater_resistance_code(target_c: f32, ambient_c: f32, calib: &CalibrationCoefficients) -> u8 {
    let target = target_c.min(400.0) as f64;

    let var1 = calib.g1 as f64 / 16.0 + 49.0;
    let var2 = (calib.g2 as f64 / 32768.0) * 0.0005 + 0.00235;
    let var3 = calib.g3 as f64 / 1024.0;
    let var4 = var1 * (1.0 + var2 * target);
    let var5 = var4 + var3 * ambient_c as f64;

    let res_heat = 3.4
        * (var5
            * (4.0 / (4.0 + calib.res_heat_range as f64))
            * (1.0 / (1.0 + calib.res_heat_val as f64 * 0.002))
            - 25.0);
    res_heat.clamp(0.0, 255.0) as u8
}

/// Encode a heater-on duration: 6-bit value with a x1/x4/x16/x64 multiplier
/// in the top two bits. Durations above 4032 ms saturate to 0xFF.
pub fn gas_wait_code(duration_ms: u16) -> u8 {
    if duration_ms >= 0xFC0 {
        return 0xFF;
    }
    let mut value = duration_ms;
    let mut factor = 0u8;
    while value > 0x3F {
        value /= 4;
        factor += 1;
    }
    (value as u8) | (factor << 6)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Coefficients in the range a real part reports
    fn calib() -> CalibrationCoefficients {
        CalibrationCoefficients {
            t1: 26085,
            t2: 26352,
            t3: 3,
            p1: 36660,
            p2: -10374,
            p3: 88,
            p4: 7328,
            p5: -107,
            p6: 30,
            p7: 66,
            p8: -4074,
            p9: -2496,
            p10: 30,
            h1: 797,
            h2: 1012,
            h3: 0,
            h4: 45,
            h5: 20,
            h6: 120,
            h7: -100,
            g1: -30,
            g2: -10000,
            g3: 18,
            res_heat_range: 1,
            res_heat_val: 40,
        }
    }

    #[test]
    fn test_temperature_plausible() {
        let (temp, t_fine) = compensate_temperature(500_000, &calib());
        assert!(temp > 20.0 && temp < 30.0, "temp = {}", temp);
        assert!((t_fine / 5120.0 - temp as f64).abs() < 1e-3);
    }

    #[test]
    fn test_temperature_monotonic_in_adc() {
        let c = calib();
        let mut last = f32::MIN;
        for adc in (300_000u32..700_000).step_by(5_000) {
            let (t, _) = compensate_temperature(adc, &c);
            assert!(t > last, "not increasing at adc {}", adc);
            last = t;
        }
    }

    #[test]
    fn test_pressure_zero_denominator() {
        let mut c = calib();
        c.p1 = 0;
        for t_fine in [-50_000.0, 0.0, 128_000.0, 250_000.0] {
            assert_eq!(compensate_pressure(400_000, &c, t_fine), 0.0);
        }
    }

    #[test]
    fn test_pressure_plausible() {
        let c = calib();
        let (_, t_fine) = compensate_temperature(500_000, &c);
        let p = compensate_pressure(300_000, &c, t_fine);
        assert!(p > 30_000.0 && p < 150_000.0, "pressure = {}", p);

        // Higher ADC code means lower pressure
        let p_high_code = compensate_pressure(350_000, &c, t_fine);
        assert!(p_high_code < p);
    }

    #[test]
    fn test_humidity_clamped_and_increasing() {
        let c = calib();
        let (_, t_fine) = compensate_temperature(500_000, &c);

        assert_eq!(compensate_humidity(0, &c, t_fine), 0.0);
        assert_eq!(compensate_humidity(u16::MAX, &c, t_fine), 100.0);

        let low = compensate_humidity(18_000, &c, t_fine);
        let high = compensate_humidity(24_000, &c, t_fine);
        assert!(low < high);
        assert!(low > 0.0 && high < 100.0);
    }

    #[test]
    fn test_gas_estimate() {
        assert_eq!(estimate_gas_resistance(0), 0.0);
        assert_eq!(estimate_gas_resistance(1000), 1000.0);
        assert!(estimate_gas_resistance(200) > estimate_gas_resistance(201));
    }

    #[test]
    fn test_gas_wait_code() {
        assert_eq!(gas_wait_code(100), 0x59);
        assert_eq!(gas_wait_code(63), 0x3F);
        assert_eq!(gas_wait_code(5000), 0xFF);
    }

    #[test]
    fn test_heater_code_rises_with_target() {
        let c = calib();
        let low = heater_resistance_code(200.0, 25.0, &c);
        let high = heater_resistance_code(320.0, 25.0, &c);
        assert!(low < high);
        assert!(high > 0);
    }
}
