//! Register model: what to read and how to reconstruct it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::decode::DecodeError;

/// Modbus register banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankKind {
    /// Holding registers (read/write, 16-bit)
    Holding,
    /// Input registers (read-only, 16-bit)
    Input,
    /// Discrete output coils (read/write, 1-bit)
    Coil,
    /// Discrete input contacts (read-only, 1-bit)
    Discrete,
}

impl BankKind {
    /// Every bank, in scan order.
    pub const ALL: [BankKind; 4] = [
        BankKind::Holding,
        BankKind::Input,
        BankKind::Coil,
        BankKind::Discrete,
    ];

    /// Return the string name for this bank.
    pub fn as_str(&self) -> &'static str {
        match self {
            BankKind::Holding => "holding",
            BankKind::Input => "input",
            BankKind::Coil => "coil",
            BankKind::Discrete => "discrete",
        }
    }

    /// Whether reads from this bank return bits instead of 16-bit words.
    pub fn is_bit(&self) -> bool {
        match self {
            BankKind::Coil | BankKind::Discrete => true,
            BankKind::Holding | BankKind::Input => false,
        }
    }
}

impl fmt::Display for BankKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown register bank name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown register type '{0}' (use holding, input, coil, or discrete)")]
pub struct UnknownBankKind(pub String);

impl FromStr for BankKind {
    type Err = UnknownBankKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "holding" => Ok(BankKind::Holding),
            "input" => Ok(BankKind::Input),
            "coil" => Ok(BankKind::Coil),
            "discrete" => Ok(BankKind::Discrete),
            _ => Err(UnknownBankKind(s.to_string())),
        }
    }
}

/// Bit-level reconstruction rule for word banks.
///
/// Multi-word encodings are big-endian: the most significant word comes first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Unsigned 16-bit integer (default)
    #[default]
    Uint16,
    /// Signed 16-bit integer
    Int16,
    /// Unsigned 32-bit integer (2 registers)
    Uint32,
    /// Signed 32-bit integer (2 registers)
    Int32,
    /// IEEE-754 single precision float (2 registers)
    Float32,
}

impl Encoding {
    /// Number of 16-bit words one value occupies.
    pub fn word_count(&self) -> u16 {
        match self {
            Encoding::Uint16 | Encoding::Int16 => 1,
            Encoding::Uint32 | Encoding::Int32 | Encoding::Float32 => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Uint16 => "uint16",
            Encoding::Int16 => "int16",
            Encoding::Uint32 => "uint32",
            Encoding::Int32 => "int32",
            Encoding::Float32 => "float32",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = DecodeError;

    /// Accepts the long names (`int16`) and the short ones (`i16`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uint16" | "u16" => Ok(Encoding::Uint16),
            "int16" | "i16" => Ok(Encoding::Int16),
            "uint32" | "u32" => Ok(Encoding::Uint32),
            "int32" | "i32" => Ok(Encoding::Int32),
            "float32" | "f32" => Ok(Encoding::Float32),
            _ => Err(DecodeError::UnknownEncoding(s.to_string())),
        }
    }
}

/// One measurement point.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterSpec {
    address: u16,
    name: String,
    description: String,
    bank: BankKind,
    encoding: Encoding,
    scale: f64,
    unit: String,
}

impl RegisterSpec {
    /// Create a spec with an empty description and unit and a scale of 1.0.
    pub fn new(address: u16, name: impl Into<String>, bank: BankKind, encoding: Encoding) -> Self {
        Self {
            address,
            name: name.into(),
            description: String::new(),
            bank,
            encoding,
            scale: 1.0,
            unit: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn bank(&self) -> BankKind {
        self.bank
    }

    /// Encoding used for word banks. Bit banks ignore it.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Multiplier applied to decoded word values. Bit banks ignore it.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Number of consecutive words (or bits) one read of this spec spans.
    pub fn word_count(&self) -> u16 {
        if self.bank.is_bit() {
            1
        } else {
            self.encoding.word_count()
        }
    }
}

/// Errors building a [`RegisterSet`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterSetError {
    #[error("duplicate register name '{0}'")]
    DuplicateName(String),
    #[error("register name cannot be empty (address {0})")]
    EmptyName(u16),
}

/// Ordered, name-unique collection of register specs.
///
/// Insertion order is the output column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterSet {
    specs: Vec<RegisterSpec>,
}

impl RegisterSet {
    /// Build a set, rejecting empty and duplicate names.
    pub fn new(specs: Vec<RegisterSpec>) -> Result<Self, RegisterSetError> {
        for (i, spec) in specs.iter().enumerate() {
            if spec.name.is_empty() {
                return Err(RegisterSetError::EmptyName(spec.address));
            }
            if specs[..i].iter().any(|other| other.name == spec.name) {
                return Err(RegisterSetError::DuplicateName(spec.name.clone()));
            }
        }
        Ok(Self { specs })
    }

    /// The map used when no registers are configured: six temperature
    /// probes on input registers 0-5 in tenths of a degree.
    pub fn default_temperature_probes() -> Self {
        let specs = (0..6u16)
            .map(|i| {
                RegisterSpec::new(i, format!("temp_{}", i + 1), BankKind::Input, Encoding::Int16)
                    .with_description(format!("Temperature Sensor {}", i + 1))
                    .with_scale(0.1)
                    .with_unit("°C")
            })
            .collect();
        Self { specs }
    }

    pub fn get(&self, name: &str) -> Option<&RegisterSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisterSpec> {
        self.specs.iter()
    }

    /// Register names in output column order.
    pub fn columns(&self) -> Vec<String> {
        self.specs.iter().map(|spec| spec.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl<'a> IntoIterator for &'a RegisterSet {
    type Item = &'a RegisterSpec;
    type IntoIter = std::slice::Iter<'a, RegisterSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}
