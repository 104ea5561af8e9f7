//! Protocol codec implementation for the resolver socket.
//!
//! Each frame is assembled into a single buffer before it is written, so a
//! failed write never leaves a half-encoded header behind a complete one.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::types::{AddressFamily, NameQuery, QueryFrame, ResolvedAddress};
use crate::MAX_NAME_LEN;

const REQUEST_HEADER_LEN: usize = 4;
const RESPONSE_META_LEN: usize = 4;

/// Codec for reading and writing resolver protocol frames
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolverCodec;

impl ResolverCodec {
    /// Read one request header and the name that follows it.
    pub async fn read_request<T>(&mut self, io: &mut T) -> io::Result<QueryFrame>
    where
        T: AsyncRead + Unpin,
    {
        let mut header = [0u8; REQUEST_HEADER_LEN];
        io.read_exact(&mut header).await?;

        let [name_len, family, max_count, more] = header;
        let family = AddressFamily::from_wire(family).ok_or_else(|| {
            invalid_data(format!("unknown address family {family} in request"))
        })?;

        let query = if name_len == 0 {
            None
        } else {
            let mut name = vec![0u8; usize::from(name_len)];
            io.read_exact(&mut name).await?;
            let name = String::from_utf8(name).map_err(|e| invalid_data(e.to_string()))?;
            Some(NameQuery { name, family, max_count })
        };

        Ok(QueryFrame { query, more: more != 0 })
    }

    /// Write a request for `query`; `more` tells the service whether to keep reading.
    pub async fn write_request<T>(&mut self, io: &mut T, query: &NameQuery, more: bool) -> io::Result<()>
    where
        T: AsyncWrite + Unpin,
    {
        let name_len = encoded_name_len(&query.name)?;

        let mut buf = Vec::with_capacity(REQUEST_HEADER_LEN + query.name.len());
        buf.extend_from_slice(&[name_len, query.family.to_wire(), query.max_count, u8::from(more)]);
        buf.extend_from_slice(query.name.as_bytes());

        io.write_all(&buf).await?;
        io.flush().await
    }

    /// Terminate a session that submitted no names at all.
    pub async fn write_end_of_requests<T>(&mut self, io: &mut T) -> io::Result<()>
    where
        T: AsyncWrite + Unpin,
    {
        io.write_all(&[0, AddressFamily::Unspec.to_wire(), 0, 0]).await?;
        io.flush().await
    }

    /// Write one resolved address record.
    pub async fn write_response<T>(
        &mut self,
        io: &mut T,
        entry: &ResolvedAddress,
        more: bool,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin,
    {
        let name_len = encoded_name_len(&entry.name)?;
        let octets = match entry.addr {
            IpAddr::V4(addr) => addr.octets().to_vec(),
            IpAddr::V6(addr) => addr.octets().to_vec(),
        };
        // octets is at most 16 long
        let addr_len = octets.len() as u16;

        let mut buf = Vec::with_capacity(RESPONSE_META_LEN + octets.len() + entry.name.len() + 2);
        buf.push(entry.family().to_wire());
        buf.push(entry.flags);
        buf.extend_from_slice(&addr_len.to_be_bytes());
        buf.extend_from_slice(&octets);
        buf.push(name_len);
        buf.extend_from_slice(entry.name.as_bytes());
        buf.push(u8::from(more));

        io.write_all(&buf).await?;
        io.flush().await
    }

    /// Read one resolved address record and its "more" flag.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly on a record boundary,
    /// which is how an empty result set is delivered.
    pub async fn read_response<T>(&mut self, io: &mut T) -> io::Result<Option<(ResolvedAddress, bool)>>
    where
        T: AsyncRead + Unpin,
    {
        let mut meta = [0u8; RESPONSE_META_LEN];
        if io.read(&mut meta[..1]).await? == 0 {
            return Ok(None);
        }
        io.read_exact(&mut meta[1..]).await?;

        let [family, flags, len_hi, len_lo] = meta;
        let family = AddressFamily::from_wire(family)
            .filter(|family| *family != AddressFamily::Unspec)
            .ok_or_else(|| invalid_data(format!("bad address family {family} in response")))?;

        let addr_len = usize::from(u16::from_be_bytes([len_hi, len_lo]));
        if family.address_len() != Some(addr_len) {
            return Err(invalid_data(format!("address length {addr_len} does not match {family}")));
        }

        let mut octets = vec![0u8; addr_len];
        io.read_exact(&mut octets).await?;
        let addr = match family {
            AddressFamily::Inet => {
                let octets: [u8; 4] = octets.try_into().map_err(|_| invalid_data("short IPv4 address"))?;
                IpAddr::V4(Ipv4Addr::from(octets))
            }
            _ => {
                let octets: [u8; 16] = octets.try_into().map_err(|_| invalid_data("short IPv6 address"))?;
                IpAddr::V6(Ipv6Addr::from(octets))
            }
        };

        let name_len = io.read_u8().await?;
        if name_len == 0 {
            return Err(invalid_data("empty name in response"));
        }
        let mut name = vec![0u8; usize::from(name_len)];
        io.read_exact(&mut name).await?;
        let name = String::from_utf8(name).map_err(|e| invalid_data(e.to_string()))?;

        let more = io.read_u8().await? != 0;

        Ok(Some((ResolvedAddress { addr, name, flags }, more)))
    }
}

fn encoded_name_len(name: &str) -> io::Result<u8> {
    if name.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("name is {} bytes, limit is {MAX_NAME_LEN}", name.len()),
        ));
    }
    Ok(name.len() as u8)
}

fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_requests_are_read_in_order() {
        let (mut client, mut server) = duplex(1024);
        let mut codec = ResolverCodec;

        let first = NameQuery::new("example.com").with_max_count(1);
        let second = NameQuery::new("example.org").with_family(AddressFamily::Inet6);
        codec.write_request(&mut client, &first, true).await.unwrap();
        codec.write_request(&mut client, &second, false).await.unwrap();

        let frame = codec.read_request(&mut server).await.unwrap();
        assert_eq!(frame.query, Some(first));
        assert!(frame.more);

        let frame = codec.read_request(&mut server).await.unwrap();
        assert_eq!(frame.query, Some(second));
        assert!(!frame.more);
    }

    #[tokio::test]
    async fn test_terminator_carries_no_name() {
        let (mut client, mut server) = duplex(64);
        let mut codec = ResolverCodec;

        codec.write_end_of_requests(&mut client).await.unwrap();

        let frame = codec.read_request(&mut server).await.unwrap();
        assert_eq!(frame, QueryFrame { query: None, more: false });
    }

    #[tokio::test]
    async fn test_unknown_family_is_rejected() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[3, 9, 0, 0, b'a', b'b', b'c']).await.unwrap();

        let err = ResolverCodec.read_request(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_truncated_name_is_an_error() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[10, 0, 0, 0, b'a']).await.unwrap();
        drop(client);

        let err = ResolverCodec.read_request(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_empty_and_oversized_names_are_not_sent() {
        let (mut client, _server) = duplex(1024);
        let mut codec = ResolverCodec;

        let empty = NameQuery::new("");
        let err = codec.write_request(&mut client, &empty, false).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let long = NameQuery::new("a".repeat(MAX_NAME_LEN + 1));
        let err = codec.write_request(&mut client, &long, false).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_responses_end_cleanly() {
        let (mut server, mut client) = duplex(1024);
        let mut codec = ResolverCodec;

        let v4 = ResolvedAddress::new("192.0.2.7".parse().unwrap(), "example.com");
        let v6 = ResolvedAddress::new("2001:db8::7".parse().unwrap(), "example.com");
        codec.write_response(&mut server, &v4, true).await.unwrap();
        codec.write_response(&mut server, &v6, false).await.unwrap();
        drop(server);

        assert_eq!(codec.read_response(&mut client).await.unwrap(), Some((v4, true)));
        assert_eq!(codec.read_response(&mut client).await.unwrap(), Some((v6, false)));
        assert_eq!(codec.read_response(&mut client).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_response_with_wrong_address_length_is_rejected() {
        let (mut server, mut client) = duplex(64);
        server.write_all(&[4, 0, 0, 16]).await.unwrap();

        let err = ResolverCodec.read_response(&mut client).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
