pub mod config_snapshot;
pub mod convolutional_encoder;
pub mod data_field;
pub mod frame_bits;
pub mod interleaver;
pub mod linear_bucket;
pub mod mac_frame;
pub mod message_queue;
pub mod ofdm_decoder;
pub mod ofdm_mapper;
pub mod scrambler;
pub mod signal_field;
pub mod slices;
pub mod snr;
pub mod stream_tags;
pub mod symbol_mapper;
pub mod viterbi_decoder;
