//! Minimal SDP reader for the audio offer of an incoming call.
//!
//! Only what codec negotiation needs is extracted: the payload types listed on
//! the first `m=audio` line and their `a=rtpmap` names. Payload types without
//! an rtpmap fall back to the static RFC 3551 assignments for G.711.

use crate::core::codec::OfferedCodec;

/// Static payload type assignments used when an offer omits `a=rtpmap`.
const STATIC_PAYLOAD_TYPES: &[(u8, &str, u32)] = &[(0, "PCMU", 8000), (8, "PCMA", 8000)];

/// Return the codecs offered in the first audio section, in offer order.
///
/// An SDP without an audio section yields an empty list.
pub fn offered_codecs(sdp: &str) -> Vec<OfferedCodec> {
    let mut lines = sdp
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.starts_with("a=rtcp:"));

    let Some(media) = lines.by_ref().find(|l| l.starts_with("m=audio ")) else {
        return Vec::new();
    };

    // m=audio <port> <proto> <fmt> ...
    let formats: Vec<u8> = media
        .split_whitespace()
        .skip(3)
        .filter_map(|f| f.parse().ok())
        .collect();

    let rtpmaps: Vec<(u8, String, u32)> = lines
        .take_while(|l| !l.starts_with("m="))
        .filter_map(parse_rtpmap)
        .collect();

    formats
        .into_iter()
        .filter_map(|pt| {
            if let Some((_, name, rate)) = rtpmaps.iter().find(|(p, _, _)| *p == pt) {
                return Some(OfferedCodec::new(name.clone(), pt, *rate));
            }
            STATIC_PAYLOAD_TYPES
                .iter()
                .find(|(p, _, _)| *p == pt)
                .map(|(p, name, rate)| OfferedCodec::new(*name, *p, *rate))
        })
        .collect()
}

/// Parse `a=rtpmap:<pt> <name>/<rate>[/<channels>]`.
fn parse_rtpmap(line: &str) -> Option<(u8, String, u32)> {
    let rest = line.strip_prefix("a=rtpmap:")?;
    let (pt, encoding) = rest.split_once(' ')?;
    let mut parts = encoding.trim().split('/');
    let name = parts.next()?.to_string();
    let rate = parts.next()?.parse().ok()?;
    Some((pt.trim().parse().ok()?, name, rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\n\
o=- 3924522 3924522 IN IP4 10.0.0.5\r\n\
s=call\r\n\
c=IN IP4 10.0.0.5\r\n\
t=0 0\r\n\
m=audio 40000 RTP/AVP 0 8 101\r\n\
a=rtcp:40001\r\n\
a=rtpmap:0 PCMU/8000\r\n\
a=rtpmap:8 PCMA/8000\r\n\
a=rtpmap:101 telephone-event/8000\r\n\
a=sendrecv\r\n";

    #[test]
    fn test_offer_order_is_kept() {
        let codecs = offered_codecs(OFFER);
        let names: Vec<_> = codecs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["PCMU", "PCMA", "telephone-event"]);
        assert_eq!(codecs[1].payload_type, 8);
        assert_eq!(codecs[1].clock_rate, 8000);
    }

    #[test]
    fn test_static_payload_types_without_rtpmap() {
        let sdp = "v=0\nm=audio 5004 RTP/AVP 8 0 18\n";
        let codecs = offered_codecs(sdp);
        assert_eq!(
            codecs,
            vec![
                OfferedCodec::new("PCMA", 8, 8000),
                OfferedCodec::new("PCMU", 0, 8000),
            ]
        );
    }

    #[test]
    fn test_rtpmap_of_other_section_is_ignored() {
        let sdp = "m=audio 5004 RTP/AVP 96\n\
a=rtpmap:96 opus/48000/2\n\
m=video 5006 RTP/AVP 8\n\
a=rtpmap:8 PCMA/8000\n";
        let codecs = offered_codecs(sdp);
        assert_eq!(codecs, vec![OfferedCodec::new("opus", 96, 48000)]);
    }

    #[test]
    fn test_no_audio_section() {
        assert!(offered_codecs("v=0\ns=-\n").is_empty());
        assert!(offered_codecs("").is_empty());
    }
}
