use itertools::izip;
use num::complex::Complex32;
use wifi_core::constellation::Constellation;

/// Groups coded bits into constellation indices, first bit in a group is the most significant.
pub fn split_symbols(bits: &[u8], nb_bpsc: usize, indices_out: &mut [u8]) {
    assert!(nb_bpsc > 0 && nb_bpsc <= 8, "Invalid number of bits per subcarrier {}", nb_bpsc);
    assert!(bits.len() == indices_out.len()*nb_bpsc, "Expected {} bits for {} symbols but got {}", indices_out.len()*nb_bpsc, indices_out.len(), bits.len());
    for (group, index) in bits.chunks_exact(nb_bpsc).zip(indices_out.iter_mut()) {
        *index = group.iter().fold(0u8, |acc, bit| (acc << 1) | (bit & 1));
    }
}

/// Writes the bits of an index MSB first.
#[inline(always)]
pub fn unpack_index(index: usize, bits_out: &mut [u8]) {
    let nb_bits = bits_out.len();
    for (i, bit) in bits_out.iter_mut().enumerate() {
        *bit = ((index >> (nb_bits-1-i)) & 1) as u8;
    }
}

/// Maps constellation indices to complex points.
pub fn modulate(constellation: &Constellation, indices: &[u8], symbols_out: &mut [Complex32]) {
    assert!(indices.len() == symbols_out.len(), "Mismatching buffer lengths {} != {}", indices.len(), symbols_out.len());
    for (index, symbol) in indices.iter().zip(symbols_out.iter_mut()) {
        *symbol = constellation.points[*index as usize];
    }
}

/// Hard decision demapping, where each decided bit is converted to the soft value +1 for 0 and -1 for 1.
pub fn demodulate_hard(constellation: &Constellation, symbols: &[Complex32], soft_out: &mut [f32]) {
    let nb_bpsc = constellation.nb_bpsc;
    assert!(symbols.len()*nb_bpsc == soft_out.len(), "Expected {} soft bits for {} symbols but got {}", symbols.len()*nb_bpsc, symbols.len(), soft_out.len());
    let mut bits = [0u8; 8];
    let bits = &mut bits[..nb_bpsc];
    for (symbol, soft) in izip!(symbols, soft_out.chunks_exact_mut(nb_bpsc)) {
        unpack_index(constellation.nearest(*symbol), bits);
        for (bit, y) in bits.iter().zip(soft.iter_mut()) {
            *y = to_soft_bit(*bit);
        }
    }
}

/// Logical bit to soft value where a 0 becomes +1 and a 1 becomes -1.
#[inline(always)]
pub fn to_soft_bit(bit: u8) -> f32 {
    (bit as f32)*(-2.0) + 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use wifi_core::encoding::Encoding;

    #[test]
    fn test_split_msb_first() {
        let bits = [1, 0, 1, 1, 1, 0];
        let mut indices = [0u8; 2];
        split_symbols(&bits, 3, &mut indices);
        assert_eq!(indices, [5, 6]);
    }

    #[test]
    fn test_hard_demap_inverts_mapping() {
        for encoding in Encoding::PRIMARY {
            let constellation = Constellation::new(encoding);
            let nb_points = constellation.points.len();
            let indices: Vec<u8> = (0..nb_points as u8).collect();
            let mut symbols = vec![Complex32::default(); nb_points];
            modulate(&constellation, &indices, &mut symbols);

            let mut soft = vec![0.0; nb_points*constellation.nb_bpsc];
            demodulate_hard(&constellation, &symbols, &mut soft);
            let bits: Vec<u8> = soft.iter().map(|x| if *x < 0.0 { 1 } else { 0 }).collect();
            let mut recovered = vec![0u8; nb_points];
            split_symbols(&bits, constellation.nb_bpsc, &mut recovered);
            assert_eq!(recovered, indices, "{}", encoding);
        }
    }
}
