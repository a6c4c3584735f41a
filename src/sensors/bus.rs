// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Register bus abstraction

use crate::error::{AcquisitionError, Result};

/// Byte-addressed register access to a single device
pub trait RegisterBus: Send {
    /// Burst-read `buf.len()` bytes starting at `register`
    fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<()>;

    /// Write one register
    fn write_register(&mut self, register: u8, value: u8) -> Result<()>;

    /// Burst-write `data` starting at `register`
    fn write_registers(&mut self, register: u8, data: &[u8]) -> Result<()> {
        for (i, byte) in data.iter().enumerate() {
            self.write_register(register.wrapping_add(i as u8), *byte)?;
        }
        Ok(())
    }

    fn read_u8(&mut self, register: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_registers(register, &mut buf)?;
        Ok(buf[0])
    }
}

impl<B: RegisterBus + ?Sized> RegisterBus for Box<B> {
    fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<()> {
        (**self).read_registers(register, buf)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        (**self).write_register(register, value)
    }

    fn write_registers(&mut self, register: u8, data: &[u8]) -> Result<()> {
        (**self).write_registers(register, data)
    }
}

/// Linux `/dev/i2c-N` device
#[cfg(feature = "hardware")]
pub struct LinuxI2cBus {
    device: i2cdev::linux::LinuxI2CDevice,
}

#[cfg(feature = "hardware")]
impl LinuxI2cBus {
    pub fn open(path: &str, address: u16) -> std::result::Result<Self, i2cdev::linux::LinuxI2CError> {
        let device = i2cdev::linux::LinuxI2CDevice::new(path, address)?;
        tracing::info!("Opened {} at address 0x{:02X}", path, address);
        Ok(Self { device })
    }
}

#[cfg(feature = "hardware")]
impl RegisterBus for LinuxI2cBus {
    fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<()> {
        use i2cdev::core::I2CDevice;
        self.device
            .write(&[register])
            .and_then(|_| self.device.read(buf))
            .map_err(|e| AcquisitionError::bus(register, e))
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        use i2cdev::core::I2CDevice;
        self.device
            .smbus_write_byte_data(register, value)
            .map_err(|e| AcquisitionError::bus(register, e))
    }

    fn write_registers(&mut self, register: u8, data: &[u8]) -> Result<()> {
        use i2cdev::core::I2CDevice;
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(register);
        frame.extend_from_slice(data);
        self.device
            .write(&frame)
            .map_err(|e| AcquisitionError::bus(register, e))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory register file used by driver tests

    use std::collections::HashSet;
    use super::*;

    pub struct MockBus {
        pub regs: [u8; 256],
        pub writes: Vec<(u8, u8)>,
        pub failing_reads: HashSet<u8>,
        pub failing_writes: HashSet<(u8, u8)>,
        /// Number of status polls before bit 7 of 0x1D is reported set
        pub polls_until_ready: Option<u32>,
        pub polls: u32,
    }

    impl MockBus {
        pub fn new() -> Self {
            Self {
                regs: [0; 256],
                writes: Vec::new(),
                failing_reads: HashSet::new(),
                failing_writes: HashSet::new(),
                polls_until_ready: Some(0),
                polls: 0,
            }
        }

        pub fn load(&mut self, start: u8, bytes: &[u8]) {
            for (i, b) in bytes.iter().enumerate() {
                self.regs[start as usize + i] = *b;
            }
        }
    }

    impl RegisterBus for MockBus {
        fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<()> {
            if self.failing_reads.contains(&register) {
                return Err(AcquisitionError::bus(register, "nack"));
            }
            if register == 0x1D {
                self.polls += 1;
                let ready = matches!(self.polls_until_ready, Some(n) if self.polls > n);
                buf[0] = if ready { 0x80 } else { 0x00 };
                return Ok(());
            }
            for (i, b) in buf.iter_mut().enumerate() {
                *b = self.regs[register as usize + i];
            }
            Ok(())
        }

        fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
            if self.failing_writes.contains(&(register, value)) {
                return Err(AcquisitionError::bus(register, "nack"));
            }
            self.writes.push((register, value));
            self.regs[register as usize] = value;
            Ok(())
        }
    }
}
