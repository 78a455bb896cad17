use crate::utils::error::{InfraError, Result};
use regex::Regex;
use std::net::Ipv4Addr;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// IPv4 CIDR 區段，例如 10.0.2.0/24
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl Ipv4Cidr {
    fn mask(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix_len))
        }
    }

    pub fn network(&self) -> u32 {
        u32::from(self.address) & self.mask()
    }

    /// `other` 是否完整落在本區段內
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix_len >= self.prefix_len && (other.network() & self.mask()) == self.network()
    }
}

pub fn parse_cidr(field_name: &str, value: &str) -> Result<Ipv4Cidr> {
    let invalid = |reason: &str| InfraError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let (addr, prefix) = value
        .split_once('/')
        .ok_or_else(|| invalid("CIDR must look like a.b.c.d/n"))?;
    let address: Ipv4Addr = addr
        .parse()
        .map_err(|_| invalid("Invalid IPv4 address"))?;
    let prefix_len: u8 = prefix
        .parse()
        .map_err(|_| invalid("Invalid prefix length"))?;
    if prefix_len > 32 {
        return Err(invalid("Prefix length must be between 0 and 32"));
    }

    let cidr = Ipv4Cidr {
        address,
        prefix_len,
    };
    if u32::from(address) != cidr.network() {
        return Err(invalid("Host bits must be zero"));
    }
    Ok(cidr)
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(InfraError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(InfraError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(InfraError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(InfraError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// 資源名稱：英數字、`-`、`_`，長度 1-80
///
/// 名稱會出現在 `${name.attr}` 參照裡，所以不接受 `.`
pub fn validate_resource_name(field_name: &str, value: &str) -> Result<()> {
    let re = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,79}$").map_err(|e| {
        InfraError::ConfigError {
            message: format!("invalid name pattern: {}", e),
        }
    })?;

    if !re.is_match(value) {
        return Err(InfraError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Use 1-80 letters, digits, '_' or '-', starting with a letter or digit"
                .to_string(),
        });
    }
    Ok(())
}

/// Storage account 名稱：3-24 個小寫英數字，全域唯一
pub fn validate_storage_account_name(field_name: &str, value: &str) -> Result<()> {
    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());

    if !valid_chars || !(3..=24).contains(&value.len()) {
        return Err(InfraError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Storage account names must be 3-24 lowercase letters or digits".to_string(),
        });
    }
    Ok(())
}
