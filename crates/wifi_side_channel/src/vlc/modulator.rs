use super::constellation::VlcConstellation;
use super::tree::VlcTree;
use num::complex::Complex32;
use wifi_core::error::{PhyError, PhyResult};
use wifi_core::ofdm_parameters::NB_DATA_CARRIERS;
use wifi_phy::snr::ErrorVectorAccumulator;

/// Nearest points of a received data symbol as `(symbol, squared distance)`, closest first.
pub type Candidates = Vec<(u8, f32)>;

/// Result of demodulating a VLC frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VlcDemodulation {
    /// Decided data symbols in transmit order, including padding.
    pub symbols: Vec<u8>,
    /// Data symbols where the marker check picked a backup candidate.
    pub nb_corrections: usize,
    /// Marker groups where no candidate combination matched the marker.
    pub nb_unresolved_groups: usize,
    pub snr_db: f32,
}

/// Maps bits onto a variable length coded constellation with periodic markers.
///
/// # Diagram
/// Layout of one marker period for `nb_markers = 4`.
/// ```text
/// | data | data | data | marker |
///    L0     L1     L2     (L0+L1+L2) mod 4
/// ```
/// `Lx` is the codeword length of the data symbol.
#[derive(Debug, Clone)]
pub struct VlcModulator {
    pub constellation: VlcConstellation,
    pub tree: VlcTree,
    /// Number of nearest candidates kept for each data symbol.
    pub nb_backup: usize,
}

impl VlcModulator {
    pub fn new(order: usize, nb_backup: usize) -> PhyResult<Self> {
        let constellation = VlcConstellation::new(order)?;
        let max_backup = constellation.nb_markers().min(order);
        if nb_backup < 1 || nb_backup > max_backup {
            return Err(PhyError::InvalidMarkerBackup { nb_backup, max: max_backup });
        }
        let tree = VlcTree::from_codewords(&constellation.codewords)?;
        assert!(tree.is_complete() && tree.nb_leaves() == order, "Codebook for order {} does not form a complete prefix code", order);
        Ok(Self {
            constellation,
            tree,
            nb_backup,
        })
    }

    pub fn order(&self) -> usize {
        self.constellation.order
    }

    pub fn nb_markers(&self) -> usize {
        self.constellation.nb_markers()
    }

    /// Parses bits into symbols. A trailing partial codeword is completed with zeros.
    /// Returns the symbols and the number of padding bits.
    pub fn mapper(&self, bits: &[u8]) -> PhyResult<(Vec<u8>, usize)> {
        let mut symbols = Vec::with_capacity(bits.len()/self.constellation.len_set[0] + 1);
        let mut node = VlcTree::ROOT;
        let mut nb_pad_bits = 0;
        let padding = std::iter::repeat(0u8);
        for (i, bit) in bits.iter().copied().chain(padding).enumerate() {
            if i >= bits.len() && node == VlcTree::ROOT {
                break;
            }
            node = self.tree.step(node, bit).ok_or(PhyError::MissingCodeBranch { node, bit })?;
            if let Some(symbol) = self.tree.symbol(node) {
                symbols.push(symbol as u8);
                node = VlcTree::ROOT;
            }
            if i >= bits.len() {
                nb_pad_bits += 1;
            }
        }
        Ok((symbols, nb_pad_bits))
    }

    /// Concatenates the codewords of the symbols.
    pub fn demapper(&self, symbols: &[u8]) -> Vec<u8> {
        symbols
            .iter()
            .flat_map(|x| self.constellation.codewords[*x as usize].iter_bits())
            .collect()
    }

    /// Number of subcarriers for `nb_symbols` data symbols once markers are inserted,
    /// rounded up to whole OFDM symbols.
    pub fn calc_total_symbols(&self, nb_symbols: usize) -> PhyResult<usize> {
        let nb_markers = self.nb_markers();
        let nb_groups = nb_symbols.div_ceil(nb_markers-1);
        nb_groups
            .checked_mul(nb_markers)
            .and_then(|x| x.div_ceil(NB_DATA_CARRIERS).checked_mul(NB_DATA_CARRIERS))
            .ok_or(PhyError::FrameTooLarge { nb_symbols: nb_symbols/NB_DATA_CARRIERS, nb_encoded_bits: 0 })
    }

    fn is_marker_position(&self, position: usize) -> bool {
        let nb_markers = self.nb_markers();
        position % nb_markers == nb_markers-1
    }

    /// Maps data symbols onto subcarriers and inserts the markers.
    /// Data positions past the end of the input carry symbol 0 as padding.
    pub fn modulate(&self, symbols: &[u8], signal_out: &mut [Complex32]) {
        let nb_markers = self.nb_markers();
        let mut data = symbols.iter().copied().chain(std::iter::repeat(0u8));
        let mut length_sum = 0;
        for (position, y) in signal_out.iter_mut().enumerate() {
            if self.is_marker_position(position) {
                *y = self.constellation.marker_points[length_sum % nb_markers];
                length_sum = 0;
                continue;
            }
            let symbol = data.next().unwrap_or(0) as usize;
            length_sum += self.constellation.bit_length(symbol);
            *y = self.constellation.points[symbol];
        }
    }

    /// Keeps the `nb_backup` nearest data points for each received symbol.
    pub fn demod_non_marker(&self, received: &[Complex32]) -> Vec<Candidates> {
        let mut distances = vec![0.0f32; self.order()];
        received
            .iter()
            .map(|x| {
                for (distance, point) in distances.iter_mut().zip(self.constellation.points.iter()) {
                    *distance = (*x - *point).norm_sqr();
                }
                index_sort(&distances)
                    .into_iter()
                    .take(self.nb_backup)
                    .map(|i| (i as u8, distances[i]))
                    .collect()
            })
            .collect()
    }

    /// Nearest marker value and its squared distance.
    pub fn marker_decode(&self, received: Complex32) -> (usize, f32) {
        let distances: Vec<f32> = self.constellation.marker_points.iter().map(|x| (received - *x).norm_sqr()).collect();
        let index = index_sort(&distances)[0];
        (index, distances[index])
    }

    /// Picks one candidate per data symbol so the codeword length sum modulo `nb_markers`
    /// equals `target`, minimising the total squared distance.
    /// Returns `None` when no combination of candidates reaches the target.
    pub fn dp_demod(&self, target: usize, candidates: &[Candidates]) -> Option<Vec<u8>> {
        let nb_markers = self.nb_markers();
        let mut costs = vec![f32::INFINITY; nb_markers];
        costs[0] = 0.0;
        // (previous residue, candidate index) that reached each residue
        let mut history: Vec<Vec<Option<(usize, usize)>>> = Vec::with_capacity(candidates.len());
        for choices in candidates {
            let mut next_costs = vec![f32::INFINITY; nb_markers];
            let mut from = vec![None; nb_markers];
            for (residue, cost) in costs.iter().enumerate() {
                if !cost.is_finite() {
                    continue;
                }
                for (j, (symbol, distance)) in choices.iter().enumerate() {
                    let next = (residue + self.constellation.bit_length(*symbol as usize)) % nb_markers;
                    let next_cost = cost + distance;
                    if next_cost < next_costs[next] {
                        next_costs[next] = next_cost;
                        from[next] = Some((residue, j));
                    }
                }
            }
            costs = next_costs;
            history.push(from);
        }

        if !costs.get(target)?.is_finite() {
            return None;
        }
        let mut symbols = vec![0u8; candidates.len()];
        let mut residue = target;
        for (i, from) in history.iter().enumerate().rev() {
            let (previous, j) = from[residue]?;
            symbols[i] = candidates[i][j].0;
            residue = previous;
        }
        Some(symbols)
    }

    /// Demodulates a frame of subcarriers including its markers.
    pub fn demodulate(&self, received: &[Complex32]) -> VlcDemodulation {
        let nb_markers = self.nb_markers();
        let mut symbols = Vec::with_capacity(received.len());
        let mut nb_corrections = 0;
        let mut nb_unresolved_groups = 0;
        let mut error_vector = ErrorVectorAccumulator::default();

        for group in received.chunks(nb_markers) {
            let (data, marker) = match group.split_last() {
                Some((marker, data)) if group.len() == nb_markers => (data, Some(*marker)),
                _ => (group, None),
            };
            let candidates = self.demod_non_marker(data);
            let nearest: Vec<u8> = candidates.iter().map(|x| x[0].0).collect();

            let decided = match marker {
                Some(marker) => {
                    let (target, distance) = self.marker_decode(marker);
                    error_vector.add_error(distance);
                    match self.dp_demod(target, &candidates) {
                        Some(decided) => decided,
                        None => {
                            nb_unresolved_groups += 1;
                            nearest.clone()
                        },
                    }
                },
                None => nearest.clone(),
            };

            nb_corrections += decided.iter().zip(nearest.iter()).filter(|(x, y)| x != y).count();
            for (x, symbol) in data.iter().zip(decided.iter()) {
                error_vector.add(*x, self.constellation.points[*symbol as usize]);
            }
            symbols.extend(decided);
        }

        VlcDemodulation {
            symbols,
            nb_corrections,
            nb_unresolved_groups,
            snr_db: error_vector.snr_db(),
        }
    }
}

/// Indices of `values` in ascending order, equal values keep their original order.
pub fn index_sort(values: &[f32]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|a, b| values[*a].total_cmp(&values[*b]));
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vlc::constellation::{Codeword, SUPPORTED_ORDERS};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn create_bits(length: usize, seed: u64) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..length).map(|_| rng.gen_range(0..=1u8)).collect()
    }

    #[test]
    fn test_backup_range() {
        assert!(VlcModulator::new(12, 4).is_ok());
        assert_eq!(VlcModulator::new(12, 5).err(), Some(PhyError::InvalidMarkerBackup { nb_backup: 5, max: 4 }));
        assert_eq!(VlcModulator::new(24, 0).err(), Some(PhyError::InvalidMarkerBackup { nb_backup: 0, max: 8 }));
        assert_eq!(VlcModulator::new(30, 1).err(), Some(PhyError::UnsupportedVlcOrder(30)));
    }

    #[test]
    fn test_mapper_round_trip() {
        for (i, order) in SUPPORTED_ORDERS.iter().enumerate() {
            let modulator = VlcModulator::new(*order, 1).unwrap();
            let bits = create_bits(501, i as u64);
            let (symbols, nb_pad_bits) = modulator.mapper(&bits).unwrap();
            assert!(nb_pad_bits < modulator.constellation.len_set[1]);
            let demapped = modulator.demapper(&symbols);
            assert_eq!(demapped.len(), bits.len() + nb_pad_bits);
            assert_eq!(&demapped[..bits.len()], &bits[..]);
            assert!(demapped[bits.len()..].iter().all(|x| *x == 0));
        }
    }

    #[test]
    fn test_mapper_incomplete_code() {
        let mut modulator = VlcModulator::new(10, 1).unwrap();
        modulator.tree = VlcTree::from_codewords(&[Codeword { bits: 0b0, length: 1 }]).unwrap();
        assert_eq!(modulator.mapper(&[0, 0]), Ok((vec![0, 0], 0)));
        assert_eq!(modulator.mapper(&[0, 1]), Err(PhyError::MissingCodeBranch { node: VlcTree::ROOT, bit: 1 }));
    }

    #[test]
    fn test_total_symbols() {
        let modulator = VlcModulator::new(10, 1).unwrap();
        // 156 data symbols need 52 groups of 4 subcarriers, which is 208 rounded up to 240
        assert_eq!(modulator.calc_total_symbols(156), Ok(240));
        assert_eq!(modulator.calc_total_symbols(36), Ok(48));
        assert!(matches!(modulator.calc_total_symbols(usize::MAX), Err(PhyError::FrameTooLarge { .. })));
        let modulator = VlcModulator::new(24, 1).unwrap();
        assert_eq!(modulator.calc_total_symbols(42), Ok(48));
        assert_eq!(modulator.calc_total_symbols(43), Ok(96));
    }

    #[test]
    fn test_markers_carry_length_sum() {
        let modulator = VlcModulator::new(20, 1).unwrap();
        let symbols: Vec<u8> = (0..20u8).collect();
        let mut signal = vec![Complex32::default(); modulator.calc_total_symbols(symbols.len()).unwrap()];
        modulator.modulate(&symbols, &mut signal);

        let constellation = &modulator.constellation;
        let expected: usize = symbols[..7].iter().map(|x| constellation.bit_length(*x as usize)).sum();
        assert_eq!(signal[7], constellation.marker_points[expected % 8]);
        assert_eq!(signal[8], constellation.points[7]);
        // Padding after the last data symbol uses symbol 0
        assert_eq!(signal[30], constellation.points[0]);
    }

    #[test]
    fn test_noiseless_demodulation() {
        for (i, order) in SUPPORTED_ORDERS.iter().enumerate() {
            let modulator = VlcModulator::new(*order, 2).unwrap();
            let (symbols, _) = modulator.mapper(&create_bits(400, 100 + i as u64)).unwrap();
            let mut signal = vec![Complex32::default(); modulator.calc_total_symbols(symbols.len()).unwrap()];
            modulator.modulate(&symbols, &mut signal);

            let result = modulator.demodulate(&signal);
            assert_eq!(&result.symbols[..symbols.len()], &symbols[..], "order {}", order);
            assert_eq!(result.nb_corrections, 0);
            assert_eq!(result.nb_unresolved_groups, 0);
        }
    }

    #[test]
    fn test_marker_corrects_length_error() {
        for (i, order) in SUPPORTED_ORDERS.iter().enumerate() {
            let constellation = VlcConstellation::new(*order).unwrap();
            let points = &constellation.points;
            let min_distance = (0..*order)
                .flat_map(|a| (0..a).map(move |b| (a, b)))
                .map(|(a, b)| (points[a] - points[b]).norm())
                .fold(f32::INFINITY, f32::min);
            // Adjacent points whose codewords differ in length
            let (sent, neighbour) = (0..*order)
                .flat_map(|a| (0..*order).map(move |b| (a, b)))
                .find(|(a, b)| {
                    constellation.bit_length(*a) != constellation.bit_length(*b)
                        && ((points[*a] - points[*b]).norm() - min_distance).abs() < 1e-4
                })
                .unwrap();

            let (mut symbols, _) = VlcModulator::new(*order, 1).unwrap().mapper(&create_bits(300, i as u64)).unwrap();
            symbols[0] = sent as u8;
            let mut signal = vec![Complex32::default(); 2*NB_DATA_CARRIERS*4];
            let nearest_only = VlcModulator::new(*order, 1).unwrap();
            nearest_only.modulate(&symbols, &mut signal);
            // Slightly closer to the neighbour than to the point that was sent
            signal[0] = points[neighbour] + (points[sent] - points[neighbour])*0.45;

            let result = nearest_only.demodulate(&signal);
            assert_eq!(result.symbols[0], neighbour as u8);
            assert_eq!(result.nb_unresolved_groups, 1);

            let with_backup = VlcModulator::new(*order, 2).unwrap();
            let result = with_backup.demodulate(&signal);
            assert_eq!(result.symbols[0], sent as u8, "order {}", order);
            assert_eq!(result.nb_corrections, 1);
            assert_eq!(result.nb_unresolved_groups, 0);
        }
    }

    #[test]
    fn test_dp_demod() {
        let modulator = VlcModulator::new(10, 2).unwrap();
        // Symbols 0..6 use 3 bits and 6..10 use 4 bits
        let candidates = vec![
            vec![(0u8, 0.1f32), (6u8, 0.2f32)],
            vec![(1u8, 0.0f32), (7u8, 0.9f32)],
            vec![(2u8, 0.0f32), (8u8, 0.8f32)],
        ];
        assert_eq!(modulator.dp_demod(9 % 4, &candidates), Some(vec![0, 1, 2]));
        assert_eq!(modulator.dp_demod(10 % 4, &candidates), Some(vec![6, 1, 2]));
        let single: Vec<Candidates> = candidates.iter().map(|x| x[..1].to_vec()).collect();
        assert_eq!(modulator.dp_demod(2, &single), None);
        assert_eq!(index_sort(&[0.3, 0.1, 0.3, 0.0]), vec![3, 1, 0, 2]);
    }
}
