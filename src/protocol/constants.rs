//! Request Protocol Constants

// Address Types
pub const ADDR_TYPE_IPV4: u8 = 0x01;
pub const ADDR_TYPE_DOMAIN: u8 = 0x03;
pub const ADDR_TYPE_IPV6: u8 = 0x04;

/// Only the low four bits of the address type byte are significant
pub const ADDR_TYPE_MASK: u8 = 0x0f;

// Field sizes
pub const ADDR_TYPE_LEN: usize = 1;
pub const IPV4_LEN: usize = 4;
pub const IPV6_LEN: usize = 16;
pub const DOMAIN_LEN_LEN: usize = 1;
pub const PORT_LEN: usize = 2;
