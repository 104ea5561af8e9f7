//! Wire protocol spoken on the resolver socket.
//!
//! Request phase, repeated until a header with `more == 0`:
//!
//! ```text
//! +----------+--------+-----------+------+------------------+
//! | name_len | family | max_count | more | name (name_len)  |
//! |    u8    |   u8   |    u8     |  u8  |      bytes       |
//! +----------+--------+-----------+------+------------------+
//! ```
//!
//! Response phase, one record per resolved address:
//!
//! ```text
//! +--------+-------+--------------+---------+----------+------+------+
//! | family | flags | addr_len u16 | address | name_len | name | more |
//! +--------+-------+--------------+---------+----------+------+------+
//! ```
//!
//! Integers are big-endian. A session with no results gets no records, the
//! service simply closes the stream.

pub mod codec;
pub mod types;

pub use codec::ResolverCodec;
pub use types::{AddressFamily, NameQuery, QueryFrame, ResolvedAddress};
