use wifi_core::encoding::Encoding;
use wifi_core::error::{PhyError, PhyResult};
use wifi_core::ofdm_parameters::OfdmParameters;
use wifi_core::tx_parameters::TxParameters;

/// Metadata attached to the first item of a frame on a sample stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTag {
    /// Number of items in the frame.
    PacketLen(usize),
    /// Number of PSDU bytes including the frame check sequence.
    PsduLen(usize),
    Encoding(Encoding),
    /// Number of VLC data symbols excluding markers and padding.
    NSymbol(usize),
    /// Order of the VLC constellation.
    NQam(usize),
}

impl StreamTag {
    pub fn key(&self) -> &'static str {
        match self {
            StreamTag::PacketLen(_) => "packet_len",
            StreamTag::PsduLen(_)   => "psdu_len",
            StreamTag::Encoding(_)  => "encoding",
            StreamTag::NSymbol(_)   => "nSymbol",
            StreamTag::NQam(_)      => "nQAM",
        }
    }
}

/// The frame level tags every block downstream of the mapper needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTags {
    pub packet_len: usize,
    pub psdu_len: usize,
    pub encoding: Encoding,
}

impl FrameTags {
    /// Collects the frame tags, which must each appear exactly once.
    pub fn from_tags(tags: &[StreamTag]) -> PhyResult<Self> {
        let packet_len = get_single(tags, "packet_len", |tag| match tag {
            StreamTag::PacketLen(x) => Some(*x),
            _ => None,
        })?;
        let psdu_len = get_single(tags, "psdu_len", |tag| match tag {
            StreamTag::PsduLen(x) => Some(*x),
            _ => None,
        })?;
        let encoding = get_single(tags, "encoding", |tag| match tag {
            StreamTag::Encoding(x) => Some(*x),
            _ => None,
        })?;
        Ok(Self {
            packet_len,
            psdu_len,
            encoding,
        })
    }

    pub fn to_tags(&self) -> Vec<StreamTag> {
        vec![
            StreamTag::PacketLen(self.packet_len),
            StreamTag::PsduLen(self.psdu_len),
            StreamTag::Encoding(self.encoding),
        ]
    }

    pub fn tx_parameters(&self) -> TxParameters {
        TxParameters::new(&OfdmParameters::new(self.encoding), self.psdu_len)
    }
}

/// Finds the VLC specific tags.
pub fn get_vlc_tags(tags: &[StreamTag]) -> PhyResult<(usize, usize)> {
    let nb_symbols = get_single(tags, "nSymbol", |tag| match tag {
        StreamTag::NSymbol(x) => Some(*x),
        _ => None,
    })?;
    let order = get_single(tags, "nQAM", |tag| match tag {
        StreamTag::NQam(x) => Some(*x),
        _ => None,
    })?;
    Ok((nb_symbols, order))
}

fn get_single<T>(tags: &[StreamTag], key: &'static str, select: impl Fn(&StreamTag) -> Option<T>) -> PhyResult<T> {
    let mut found = 0;
    let mut value = None;
    for tag in tags {
        if let Some(x) = select(tag) {
            found += 1;
            value = Some(x);
        }
    }
    match (found, value) {
        (1, Some(value)) => Ok(value),
        _ => Err(PhyError::MissingMetadata { key, found }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_tags() {
        let tags = [StreamTag::Encoding(Encoding::Qpsk1_2), StreamTag::PacketLen(480), StreamTag::PsduLen(33)];
        let frame = FrameTags::from_tags(&tags).unwrap();
        assert_eq!(frame, FrameTags { packet_len: 480, psdu_len: 33, encoding: Encoding::Qpsk1_2 });
        assert_eq!(FrameTags::from_tags(&frame.to_tags()), Ok(frame));
    }

    #[test]
    fn test_missing_and_duplicate_tags() {
        let missing = [StreamTag::PacketLen(480), StreamTag::PsduLen(33)];
        assert_eq!(FrameTags::from_tags(&missing), Err(PhyError::MissingMetadata { key: "encoding", found: 0 }));

        let duplicate = [StreamTag::PacketLen(480), StreamTag::PsduLen(33), StreamTag::PsduLen(34), StreamTag::Encoding(Encoding::Bpsk1_2)];
        assert_eq!(FrameTags::from_tags(&duplicate), Err(PhyError::MissingMetadata { key: "psdu_len", found: 2 }));
    }

    #[test]
    fn test_vlc_tags() {
        let tags = [StreamTag::NSymbol(120), StreamTag::NQam(12)];
        assert_eq!(get_vlc_tags(&tags), Ok((120, 12)));
        assert!(get_vlc_tags(&tags[..1]).is_err());
    }
}
