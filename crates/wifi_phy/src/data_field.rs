use crate::convolutional_encoder::{convolutional_encode, depuncture, get_punctured_length, puncture};
use crate::frame_bits::{generate_data_bits, pack_bytes_lsb};
use crate::interleaver::Interleaver;
use crate::scrambler::{descramble, scramble_data_field};
use crate::symbol_mapper::split_symbols;
use crate::viterbi_decoder::ViterbiDecoder;
use tracing::debug;
use wifi_core::encoding::CodeRate;
use wifi_core::ofdm_parameters::OfdmParameters;
use wifi_core::tx_parameters::{TxParameters, NB_SERVICE_BITS};

/// Number of SERVICE bytes in front of the PSDU after decoding.
pub const NB_SERVICE_BYTES: usize = NB_SERVICE_BITS/8;

/// Scrambled, convolutionally coded and punctured DATA field bits.
pub fn encode_data_bits(psdu: &[u8], rate: CodeRate, tx: &TxParameters) -> Vec<u8> {
    let mut data_bits = vec![0u8; tx.nb_data_bits];
    generate_data_bits(psdu, tx, &mut data_bits);
    scramble_data_field(&mut data_bits, tx);

    let mut coded_bits = vec![0u8; tx.nb_data_bits*2];
    convolutional_encode(&data_bits, &mut coded_bits);

    let nb_punctured = get_punctured_length(coded_bits.len(), rate);
    let mut punctured_bits = vec![0u8; nb_punctured];
    puncture(&coded_bits, &mut punctured_bits, rate);
    punctured_bits
}

/// Runs the full transmit bit chain and returns one constellation index per subcarrier.
pub fn encode_data_field(psdu: &[u8], ofdm: &OfdmParameters) -> (TxParameters, Vec<u8>) {
    let tx = TxParameters::new(ofdm, psdu.len());
    let punctured_bits = encode_data_bits(psdu, ofdm.encoding.code_rate(), &tx);
    assert!(punctured_bits.len() == tx.nb_encoded_bits, "Punctured {} bits but expected {}", punctured_bits.len(), tx.nb_encoded_bits);

    let mut interleaved_bits = vec![0u8; tx.nb_encoded_bits];
    Interleaver::new(ofdm.nb_cbps, ofdm.nb_bpsc).interleave(&punctured_bits, &mut interleaved_bits);

    let mut indices = vec![0u8; tx.nb_encoded_bits/ofdm.nb_bpsc];
    split_symbols(&interleaved_bits, ofdm.nb_bpsc, &mut indices);
    debug!(psdu_size = tx.psdu_size, nb_symbols = tx.nb_symbols, encoding = %ofdm.encoding, "encoded data field");
    (tx, indices)
}

/// Decodes punctured soft bits into bytes, starting with the two SERVICE bytes.
/// Only the bits up to the end of the tail are decoded, so the trellis ends in the zero state.
pub fn decode_coded_bits(soft_in: &[f32], rate: CodeRate, tx: &TxParameters, viterbi: &mut ViterbiDecoder) -> Vec<u8> {
    let mut depunctured = vec![0.0f32; tx.nb_data_bits*2];
    depuncture(soft_in, &mut depunctured, rate);

    let nb_bits = tx.tail_end();
    let mut decoded_bits = vec![0u8; nb_bits];
    viterbi.decode(&depunctured[..2*nb_bits], &mut decoded_bits);

    let mut descrambled_bits = vec![0u8; nb_bits];
    descramble(&decoded_bits, &mut descrambled_bits);

    let mut bytes = vec![0u8; nb_bits/8];
    pack_bytes_lsb(&descrambled_bits, &mut bytes);
    bytes
}

/// Receive chain for interleaved soft bits of a whole DATA field.
pub fn decode_data_field(soft_in: &[f32], ofdm: &OfdmParameters, tx: &TxParameters, viterbi: &mut ViterbiDecoder) -> Vec<u8> {
    assert!(soft_in.len() == tx.nb_encoded_bits, "Expected {} soft bits but got {}", tx.nb_encoded_bits, soft_in.len());
    let mut deinterleaved = vec![0.0f32; tx.nb_encoded_bits];
    Interleaver::new(ofdm.nb_cbps, ofdm.nb_bpsc).deinterleave(soft_in, &mut deinterleaved);
    decode_coded_bits(&deinterleaved, ofdm.encoding.code_rate(), tx, viterbi)
}
