// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! BME688 compensation coefficients

use tracing::{debug, error};

use crate::error::{AcquisitionError, Result};
use crate::sensors::bus::RegisterBus;
use super::regs;

/// Factory-trimmed coefficients read once per device session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalibrationCoefficients {
    pub t1: u16,
    pub t2: i16,
    pub t3: i8,

    pub p1: u16,
    pub p2: i16,
    pub p3: i8,
    pub p4: i16,
    pub p5: i16,
    pub p6: i8,
    pub p7: i8,
    pub p8: i16,
    pub p9: i16,
    pub p10: u8,

    pub h1: u16,
    pub h2: u16,
    pub h3: i8,
    pub h4: i8,
    pub h5: i8,
    pub h6: u8,
    pub h7: i8,

    pub g1: i8,
    pub g2: i16,
    pub g3: i8,
    pub res_heat_range: u8,
    pub res_heat_val: i8,
}

impl CalibrationCoefficients {
    /// Read every calibration region. Any failed read or an all-zero result
    /// yields `CalibrationUnavailable`; there is no partially decoded value.
    pub fn decode<B: RegisterBus + ?Sized>(bus: &mut B) -> Result<Self> {
        let coeffs = Self::read_all(bus).map_err(|e| {
            error!("Calibration read failed: {}", e);
            AcquisitionError::CalibrationUnavailable
        })?;

        if coeffs.is_blank() {
            error!("Calibration registers are all zero");
            return Err(AcquisitionError::CalibrationUnavailable);
        }

        debug!("Decoded calibration: {:?}", coeffs);
        Ok(coeffs)
    }

    fn read_all<B: RegisterBus + ?Sized>(bus: &mut B) -> Result<Self> {
        let mut c = Self::default();

        let mut pair = [0u8; 2];
        bus.read_registers(regs::CALIB_T1, &mut pair)?;
        c.t1 = u16::from_le_bytes(pair);
        bus.read_registers(regs::CALIB_T2, &mut pair)?;
        c.t2 = i16::from_le_bytes(pair);
        c.t3 = bus.read_u8(regs::CALIB_T3)? as i8;

        let mut press = [0u8; regs::CALIB_PRESS_LEN];
        bus.read_registers(regs::CALIB_PRESS, &mut press)?;
        c.decode_pressure(&press);

        let mut hum = [0u8; regs::CALIB_HUM_LEN];
        bus.read_registers(regs::CALIB_HUM, &mut hum)?;
        c.decode_humidity(&hum);

        c.g1 = bus.read_u8(regs::CALIB_G1)? as i8;
        bus.read_registers(regs::CALIB_G2, &mut pair)?;
        c.g2 = i16::from_le_bytes(pair);
        c.g3 = bus.read_u8(regs::CALIB_G3)? as i8;
        c.res_heat_range = (bus.read_u8(regs::RES_HEAT_RANGE)? & 0x30) >> 4;
        c.res_heat_val = bus.read_u8(regs::RES_HEAT_VAL)? as i8;

        Ok(c)
    }

    /// Block starting at 0x8E. Datasheet layout: 19 bytes with unused bytes at
    /// 5, 12 and 13, not a packed 16-byte run.
    fn decode_pressure(&mut self, b: &[u8; regs::CALIB_PRESS_LEN]) {
        self.p1 = u16::from_le_bytes([b[0], b[1]]);
        self.p2 = i16::from_le_bytes([b[2], b[3]]);
        self.p3 = b[4] as i8;
        self.p4 = i16::from_le_bytes([b[6], b[7]]);
        self.p5 = i16::from_le_bytes([b[8], b[9]]);
        self.p7 = b[10] as i8;
        self.p6 = b[11] as i8;
        self.p8 = i16::from_le_bytes([b[14], b[15]]);
        self.p9 = i16::from_le_bytes([b[16], b[17]]);
        self.p10 = b[18];
    }

    /// Block starting at 0xE1. h1 and h2 share the nibbles of byte 1.
    pub(crate) fn decode_humidity(&mut self, b: &[u8; regs::CALIB_HUM_LEN]) {
        self.h1 = ((b[2] as u16) << 4) | (b[1] & 0x0F) as u16;
        self.h2 = ((b[0] as u16) << 4) | (b[1] >> 4) as u16;
        self.h3 = b[3] as i8;
        self.h4 = b[4] as i8;
        self.h5 = b[5] as i8;
        self.h6 = b[6];
        self.h7 = b[7] as i8;
    }

    pub fn is_blank(&self) -> bool {
        *self == Self::default()
    }
}
