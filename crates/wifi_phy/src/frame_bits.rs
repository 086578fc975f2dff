use crate::slices::span_slice;
use wifi_core::tx_parameters::{TxParameters, NB_SERVICE_BITS};

/// Lays out the DATA field before scrambling.
/// The SERVICE field, tail and pad bits are left as zeros and PSDU bytes are written LSB first.
pub fn generate_data_bits(psdu: &[u8], tx: &TxParameters, bits_out: &mut [u8]) {
    assert!(psdu.len() == tx.psdu_size, "PSDU has {} bytes but parameters expect {}", psdu.len(), tx.psdu_size);
    assert!(bits_out.len() == tx.nb_data_bits, "Data field has {} bits but expected {}", bits_out.len(), tx.nb_data_bits);
    bits_out.fill(0);
    unpack_bytes_lsb(psdu, &mut bits_out[span_slice(NB_SERVICE_BITS, 8*psdu.len())]);
}

pub fn unpack_bytes_lsb(bytes: &[u8], bits_out: &mut [u8]) {
    assert!(bytes.len()*8 == bits_out.len(), "Expected {} bits for {} bytes but got {}", bytes.len()*8, bytes.len(), bits_out.len());
    for (byte, bits) in bytes.iter().zip(bits_out.chunks_exact_mut(8)) {
        for (i, bit) in bits.iter_mut().enumerate() {
            *bit = (byte >> i) & 1;
        }
    }
}

/// Packs bits into bytes LSB first. Trailing bits that do not fill a byte are ignored.
pub fn pack_bytes_lsb(bits: &[u8], bytes_out: &mut [u8]) {
    for (bits, byte) in bits.chunks_exact(8).zip(bytes_out.iter_mut()) {
        *byte = bits
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, bit)| acc | ((bit & 1) << i));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wifi_core::encoding::Encoding;
    use wifi_core::ofdm_parameters::OfdmParameters;

    #[test]
    fn test_service_field_and_lsb_order() {
        let tx = TxParameters::new(&OfdmParameters::new(Encoding::Bpsk1_2), 2);
        let mut bits = vec![1u8; tx.nb_data_bits];
        generate_data_bits(&[0x01, 0x80], &tx, &mut bits);
        assert!(bits[..16].iter().all(|x| *x == 0));
        assert_eq!(&bits[16..24], &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bits[24..32], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert!(bits[32..].iter().all(|x| *x == 0));
    }

    #[test]
    fn test_pack_unpack() {
        let bytes = [0xA5u8, 0x3C, 0x00, 0xFF];
        let mut bits = vec![0u8; 32];
        unpack_bytes_lsb(&bytes, &mut bits);
        let mut packed = [0u8; 4];
        pack_bytes_lsb(&bits, &mut packed);
        assert_eq!(packed, bytes);
    }
}
