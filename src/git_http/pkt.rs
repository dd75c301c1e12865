//! pkt-line framing for the hand-written part of the advertisement.
//!
//! Only the service announcement header is framed here; everything after it
//! comes verbatim from the git subprocess.

use super::GitService;

pub const PKT_FLUSH: &[u8] = b"0000";

/// Frame one pkt-line: a 4-hex-digit length prefix (including itself)
/// followed by the payload.
pub fn encode_pkt_line(data: &[u8]) -> Vec<u8> {
    let len = 4 + data.len();
    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(format!("{len:04x}").as_bytes());
    out.extend_from_slice(data);
    out
}

/// The first packet of an `info/refs` response:
/// `# service=<name>\n` framed as a pkt-line, then a flush packet.
pub fn service_announcement(service: GitService) -> Vec<u8> {
    let payload = format!("# service={service}\n");
    let mut out = encode_pkt_line(payload.as_bytes());
    out.extend_from_slice(PKT_FLUSH);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkt_line_length_prefix_counts_itself() {
        let enc = encode_pkt_line(b"hello\n");
        assert_eq!(&enc[..4], b"000a");
        assert_eq!(&enc[4..], b"hello\n");
    }

    #[test]
    fn upload_pack_announcement_framing() {
        // payload is 26 bytes, so the prefix is hex(26 + 4) = 001e
        assert_eq!(
            service_announcement(GitService::UploadPack),
            b"001e# service=git-upload-pack\n0000"
        );
    }

    #[test]
    fn receive_pack_announcement_framing() {
        assert_eq!(
            service_announcement(GitService::ReceivePack),
            b"001f# service=git-receive-pack\n0000"
        );
    }
}
