//! On-the-wire frame layout.
//!
//! A transmitted frame is `radiotap + dot11-QoS + app header + payload`;
//! received buffers additionally carry the PHY's 4-byte FCS trailer. All
//! multi-byte fields are little-endian and every header is encoded and
//! decoded through explicit byte helpers; the receive buffer is never
//! reinterpreted through packed structs.

pub mod app;
pub mod dot11;
pub mod radiotap;

pub use app::IwabHeader;
pub use dot11::Dot11Header;

use crate::error::FrameError;

/// Maximum wire size of one frame including all headers.
pub const MAX_FRAME: usize = 1600;

/// Maximum payload carried by one frame. Leaves room for the header stack
/// and FCS within [`MAX_FRAME`] on any monitor-mode driver we have seen.
pub const MAX_PAYLOAD: usize = 1400;

/// FCS trailer appended by the PHY on receive, never part of the payload.
pub const FCS_LEN: usize = 4;

/// Total header bytes prepended by the transmit path.
pub const HEADERS_LEN: usize = radiotap::TX_LEN + dot11::LEN + app::LEN;

/// A parsed view into one received frame.
///
/// Borrows the caller's receive buffer; valid until the buffer is reused
/// for the next read.
#[derive(Debug)]
pub struct FrameView<'a> {
    /// Length of the (skipped) radiotap preamble.
    pub radiotap_len: usize,
    pub dot11: Dot11Header,
    pub header: IwabHeader,
    /// PCM payload, FCS excluded.
    pub payload: &'a [u8],
}

/// Parse a received link-layer buffer into a [`FrameView`].
///
/// `filter` is the configured group address that must appear in all three
/// dot11 address fields; `frame_size` is the sample-frame alignment of the
/// stream, used for the minimum-payload check.
///
/// The checks run in wire order: radiotap coverage, frame type, address
/// filter, then payload coverage (app header + at least one sample frame +
/// FCS). Any failure means "not an iwab frame": drop it and keep draining.
pub fn parse_frame<'a>(
    buf: &'a [u8],
    filter: &[u8; 6],
    frame_size: usize,
) -> Result<FrameView<'a>, FrameError> {
    let radiotap_len = radiotap::declared_len(buf).ok_or(FrameError::Truncated {
        got: buf.len(),
        need: radiotap::HEAD_LEN,
    })?;

    if buf.len() <= radiotap_len + dot11::LEN {
        return Err(FrameError::Truncated {
            got: buf.len(),
            need: radiotap_len + dot11::LEN,
        });
    }

    let dot11 = Dot11Header::parse(&buf[radiotap_len..]);
    if !dot11.is_qos_data() {
        return Err(FrameError::NotQosData {
            ftype: dot11.ftype(),
            subtype: dot11.subtype(),
        });
    }

    if dot11.addr1 != *filter || dot11.addr2 != *filter || dot11.addr3 != *filter {
        return Err(FrameError::AddressFilter);
    }

    let offset = radiotap_len + dot11::LEN;
    let rest = buf.len() - offset;
    if rest < app::LEN + frame_size + FCS_LEN {
        return Err(FrameError::ShortPayload {
            got: rest,
            need: app::LEN + frame_size + FCS_LEN,
        });
    }

    let header = IwabHeader::parse(&buf[offset..]);
    let payload = &buf[offset + app::LEN..buf.len() - FCS_LEN];

    Ok(FrameView {
        radiotap_len,
        dot11,
        header,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: [u8; 6] = [0; 6];

    fn wire_frame(header: &IwabHeader, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut rt = [0u8; radiotap::TX_LEN];
        radiotap::build_tx(3, &mut rt);
        buf.extend_from_slice(&rt);
        let mut mac = [0u8; dot11::LEN];
        dot11::build(&GROUP, &mut mac);
        buf.extend_from_slice(&mac);
        let mut app = [0u8; app::LEN];
        header.write(&mut app);
        buf.extend_from_slice(&app);
        buf.extend_from_slice(payload);
        buf.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]); // FCS stand-in
        buf
    }

    #[test]
    fn test_parse_roundtrip() {
        let header = IwabHeader {
            version: 0,
            length: 8,
            seq: 7,
            timestamp: 123_456,
            retry: 0,
        };
        let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let buf = wire_frame(&header, &payload);

        let view = parse_frame(&buf, &GROUP, 4).unwrap();
        assert_eq!(view.radiotap_len, radiotap::TX_LEN);
        assert_eq!(view.header.seq, 7);
        assert_eq!(view.header.timestamp, 123_456);
        assert_eq!(view.header.length, 8);
        assert_eq!(view.payload, &payload);
    }

    #[test]
    fn test_rejects_address_mismatch() {
        let header = IwabHeader {
            version: 0,
            length: 4,
            seq: 1,
            timestamp: 0,
            retry: 0,
        };
        let buf = wire_frame(&header, &[0u8; 4]);
        let other = [0x02, 0, 0, 0, 0, 1];
        assert_eq!(
            parse_frame(&buf, &other, 4).unwrap_err(),
            FrameError::AddressFilter
        );
    }

    #[test]
    fn test_rejects_truncated() {
        let header = IwabHeader {
            version: 0,
            length: 4,
            seq: 1,
            timestamp: 0,
            retry: 0,
        };
        let buf = wire_frame(&header, &[0u8; 4]);
        // cut into the dot11 header
        let cut = &buf[..radiotap::TX_LEN + 10];
        assert!(matches!(
            parse_frame(cut, &GROUP, 4),
            Err(FrameError::Truncated { .. })
        ));
        // cut the FCS off: payload can no longer cover header + frame + FCS
        let cut = &buf[..buf.len() - 5];
        assert!(matches!(
            parse_frame(cut, &GROUP, 4),
            Err(FrameError::ShortPayload { .. })
        ));
    }

    #[test]
    fn test_rejects_non_qos_data() {
        let header = IwabHeader {
            version: 0,
            length: 4,
            seq: 1,
            timestamp: 0,
            retry: 0,
        };
        let mut buf = wire_frame(&header, &[0u8; 4]);
        // rewrite frame control as a beacon (type 0, subtype 8)
        buf[radiotap::TX_LEN] = 0x80;
        assert!(matches!(
            parse_frame(&buf, &GROUP, 4),
            Err(FrameError::NotQosData { ftype: 0, .. })
        ));
    }
}
