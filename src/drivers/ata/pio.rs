use core::fmt;
use x86_64::instructions::port::Port;

// ──────────────────────────────────────────────────────────────
//  ATA PIO port offsets (relative to io_base)
// ──────────────────────────────────────────────────────────────

const DATA_REG: u16        = 0; // R/W data (16-bit)
const ERROR_REG: u16       = 1; // R: error / W: features
const SECTOR_COUNT: u16    = 2;
const LBA_LOW: u16         = 3;
const LBA_MID: u16         = 4;
const LBA_HIGH: u16        = 5;
const DRIVE_HEAD: u16      = 6;
const CMD_STATUS: u16      = 7; // R: status / W: command

// Status register bits
const STATUS_BSY: u8  = 0x80;
const STATUS_DRQ: u8  = 0x08;
const STATUS_ERR: u8  = 0x01;
const STATUS_DF: u8   = 0x20;

// ATA commands
const CMD_IDENTIFY: u8      = 0xEC;
const CMD_READ_SECTORS: u8  = 0x20;
const CMD_WRITE_SECTORS: u8 = 0x30;
const CMD_CACHE_FLUSH: u8   = 0xE7;

/// Upper bound on every status poll. Exhausting it surfaces as a timeout
/// error instead of hanging the kernel on a dead drive.
const POLL_LIMIT: u32 = 100_000;

/// Largest LBA addressable with the 28-bit read/write commands.
const LBA28_MAX: u64 = 0x0FFF_FFFF;

// ──────────────────────────────────────────────────────────────
//  Error type
// ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtaError {
    DeviceNotFound,
    DeviceFault,
    BusyTimeout,
    DrqTimeout,
    LbaOutOfRange,
}

impl fmt::Display for AtaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AtaError::DeviceNotFound => write!(f, "Device not found"),
            AtaError::DeviceFault    => write!(f, "Device fault"),
            AtaError::BusyTimeout    => write!(f, "BSY timeout"),
            AtaError::DrqTimeout     => write!(f, "DRQ timeout"),
            AtaError::LbaOutOfRange  => write!(f, "LBA beyond 28-bit range"),
        }
    }
}

pub type AtaResult<T> = Result<T, AtaError>;

// ──────────────────────────────────────────────────────────────
//  ATA Device
// ──────────────────────────────────────────────────────────────

pub struct AtaDevice {
    io_base: u16,
    ctrl_base: u16,
    is_master: bool,
    pub detected: bool,
}

impl AtaDevice {
    pub const fn new(io_base: u16, ctrl_base: u16, is_master: bool) -> Self {
        AtaDevice {
            io_base,
            ctrl_base,
            is_master,
            detected: false,
        }
    }

    // ── Port I/O helpers ─────────────────────────────────────

    fn read_port(&self, offset: u16) -> u8 {
        let mut port = Port::<u8>::new(self.io_base + offset);
        unsafe { port.read() }
    }

    fn write_port(&self, offset: u16, val: u8) {
        let mut port = Port::<u8>::new(self.io_base + offset);
        unsafe { port.write(val) }
    }

    fn read_data16(&self) -> u16 {
        let mut port = Port::<u16>::new(self.io_base + DATA_REG);
        unsafe { port.read() }
    }

    fn write_data16(&self, val: u16) {
        let mut port = Port::<u16>::new(self.io_base + DATA_REG);
        unsafe { port.write(val) }
    }

    fn read_ctrl(&self) -> u8 {
        let mut port = Port::<u8>::new(self.ctrl_base);
        unsafe { port.read() }
    }

    // ── Status polling (always bounded) ──────────────────────

    /// Wait until BSY clears. Returns Err after `POLL_LIMIT` reads.
    fn wait_not_busy(&self) -> AtaResult<()> {
        for _ in 0..POLL_LIMIT {
            if self.read_port(CMD_STATUS) & STATUS_BSY == 0 {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(AtaError::BusyTimeout)
    }

    /// Wait until DRQ is set (data ready), checking for device errors.
    /// Returns Err after `POLL_LIMIT` reads.
    fn wait_data_ready(&self) -> AtaResult<()> {
        for _ in 0..POLL_LIMIT {
            let status = self.read_port(CMD_STATUS);
            if status & (STATUS_ERR | STATUS_DF) != 0 {
                return Err(AtaError::DeviceFault);
            }
            if status & STATUS_DRQ != 0 {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(AtaError::DrqTimeout)
    }

    /// 400ns settle delay: four reads of the alternate status register.
    fn delay_400ns(&self) {
        for _ in 0..4 {
            let _ = self.read_ctrl();
        }
    }

    /// Select the drive and load the top four LBA bits.
    fn select(&self, lba: u64) {
        let head = if self.is_master { 0xE0 } else { 0xF0 };
        self.write_port(DRIVE_HEAD, head | ((lba >> 24) as u8 & 0x0F));
        self.delay_400ns();
    }

    /// Program a one-sector LBA28 command and wait for the data phase.
    fn issue(&self, lba: u64, command: u8) -> AtaResult<()> {
        if !self.detected {
            return Err(AtaError::DeviceNotFound);
        }
        if lba > LBA28_MAX {
            return Err(AtaError::LbaOutOfRange);
        }
        self.wait_not_busy()?;
        self.select(lba);
        self.write_port(ERROR_REG, 0); // features = 0
        self.write_port(SECTOR_COUNT, 1); // one sector per command
        self.write_port(LBA_LOW, lba as u8);
        self.write_port(LBA_MID, (lba >> 8) as u8);
        self.write_port(LBA_HIGH, (lba >> 16) as u8);
        self.write_port(CMD_STATUS, command);
        self.wait_data_ready()
    }

    // ── IDENTIFY ─────────────────────────────────────────────

    /// Probe the drive. Sets `detected` on success.
    pub fn identify(&mut self) -> AtaResult<()> {
        let head = if self.is_master { 0xA0 } else { 0xB0 };
        self.write_port(DRIVE_HEAD, head);
        self.delay_400ns();
        self.write_port(SECTOR_COUNT, 0);
        self.write_port(LBA_LOW, 0);
        self.write_port(LBA_MID, 0);
        self.write_port(LBA_HIGH, 0);
        self.write_port(CMD_STATUS, CMD_IDENTIFY);

        // status 0 means nothing is attached
        if self.read_port(CMD_STATUS) == 0 {
            return Err(AtaError::DeviceNotFound);
        }
        self.wait_not_busy()?;

        // non-zero LBA mid/high after IDENTIFY means not ATA (likely ATAPI)
        if self.read_port(LBA_MID) != 0 || self.read_port(LBA_HIGH) != 0 {
            return Err(AtaError::DeviceNotFound);
        }
        self.wait_data_ready()?;

        // drain the 256-word identify block
        for _ in 0..256 {
            let _ = self.read_data16();
        }

        self.detected = true;
        Ok(())
    }

    // ── Sector transfer (LBA28, one sector per command) ──────

    pub fn read_sector(&self, lba: u64, buf: &mut [u8; 512]) -> AtaResult<()> {
        self.issue(lba, CMD_READ_SECTORS)?;
        for i in 0..256 {
            let word = self.read_data16();
            buf[i * 2] = (word & 0xFF) as u8;
            buf[i * 2 + 1] = (word >> 8) as u8;
        }
        Ok(())
    }

    pub fn write_sector(&self, lba: u64, buf: &[u8; 512]) -> AtaResult<()> {
        self.issue(lba, CMD_WRITE_SECTORS)?;
        for i in 0..256 {
            let word = (buf[i * 2] as u16) | ((buf[i * 2 + 1] as u16) << 8);
            self.write_data16(word);
        }
        // flush the drive cache so the write is durable before returning
        self.write_port(CMD_STATUS, CMD_CACHE_FLUSH);
        self.wait_not_busy()?;
        Ok(())
    }
}
