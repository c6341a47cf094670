//! Command opcodes understood by the daemon.
//!
//! The numeric values are the daemon's wire contract and must never change.

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $code:literal,)*) => {
        /// A daemon command.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum Opcode {
            $($(#[$doc])* $name = $code,)*
        }

        impl Opcode {
            /// Every opcode, in numeric order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// Look up an opcode by its numeric value.
            pub fn from_code(code: u32) -> Option<Self> {
                match code {
                    $($code => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Mnemonic used by the daemon's own tooling.
            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$name => stringify!($name),)*
                }
            }
        }
    };
}

opcodes! {
    /// Set GPIO mode.
    Modes = 0,
    /// Get GPIO mode.
    Modeg = 1,
    /// Set pull-up/down.
    Pud = 2,
    /// Read GPIO level.
    Read = 3,
    /// Write GPIO level.
    Write = 4,
    Pwm = 5,
    Prs = 6,
    Pfs = 7,
    Servo = 8,
    Wdog = 9,
    /// Read levels of bank 1 (GPIO 0-31).
    Br1 = 10,
    Br2 = 11,
    Bc1 = 12,
    Bc2 = 13,
    Bs1 = 14,
    Bs2 = 15,
    /// Current daemon tick.
    Tick = 16,
    /// Hardware revision.
    Hwver = 17,
    /// Open a notification pipe.
    No = 18,
    /// Begin notifications for a GPIO mask.
    Nb = 19,
    /// Pause notifications.
    Np = 20,
    /// Close notifications.
    Nc = 21,
    Prg = 22,
    Pfg = 23,
    Prrg = 24,
    Help = 25,
    /// Daemon version.
    Pigpv = 26,
    Wvclr = 27,
    Wvag = 28,
    Wvas = 29,
    Wvgo = 30,
    Wvgor = 31,
    Wvbsy = 32,
    Wvhlt = 33,
    Wvsm = 34,
    Wvsp = 35,
    Wvsc = 36,
    Trig = 37,
    Proc = 38,
    Procd = 39,
    Procr = 40,
    Procs = 41,
    Slro = 42,
    Slr = 43,
    Slrc = 44,
    Procp = 45,
    Mics = 46,
    Mils = 47,
    Parse = 48,
    Wvcre = 49,
    Wvdel = 50,
    Wvtx = 51,
    Wvtxr = 52,
    Wvnew = 53,
    /// Open an I2C device.
    I2co = 54,
    /// Close an I2C device.
    I2cc = 55,
    /// Read bytes from an I2C device.
    I2crd = 56,
    /// Write bytes to an I2C device.
    I2cwd = 57,
    I2cwq = 58,
    I2crs = 59,
    I2cws = 60,
    I2crb = 61,
    I2cwb = 62,
    I2crw = 63,
    I2cww = 64,
    I2crk = 65,
    I2cwk = 66,
    I2cri = 67,
    I2cwi = 68,
    I2cpc = 69,
    I2cpk = 70,
    /// Open a SPI channel.
    Spio = 71,
    Spic = 72,
    Spir = 73,
    Spiw = 74,
    Spix = 75,
    /// Open a serial device.
    Sero = 76,
    Serc = 77,
    Serrb = 78,
    Serwb = 79,
    Serr = 80,
    Serw = 81,
    Serda = 82,
    Gdc = 83,
    Gpw = 84,
    Hc = 85,
    Hp = 86,
    Cf1 = 87,
    Cf2 = 88,
    Bi2cc = 89,
    Bi2co = 90,
    Bi2cz = 91,
    I2cz = 92,
    Wvcha = 93,
    Slri = 94,
    Cgi = 95,
    Csi = 96,
    Fg = 97,
    Fn = 98,
    /// Open an in-band notification stream on the issuing socket.
    Noib = 99,
    Wvtxm = 100,
    Wvtat = 101,
    Pads = 102,
    Padg = 103,
    Fo = 104,
    Fc = 105,
    Fr = 106,
    Fw = 107,
    Fs = 108,
    Fl = 109,
    Shell = 110,
    Bspic = 111,
    Bspio = 112,
    Bspix = 113,
    Bscx = 114,
    Evm = 115,
    Evt = 116,
    Procu = 117,
    Wvcap = 118,
}

impl Opcode {
    /// Numeric value sent on the wire.
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name().to_uppercase(), self.code())
    }
}
