mod channel;

use channel::AwgnChannel;
use clap::{Parser, ValueEnum};
use num::complex::Complex32;
use std::io::{BufWriter, Read, Write};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use wifi_core::constellation::Constellation;
use wifi_core::encoding::Encoding;
use wifi_core::error::PhyResult;
use wifi_core::ofdm_parameters::OfdmParameters;
use wifi_phy::mac_frame::{MacFrame, MacFramer, MacSettings, MAX_MSDU_LENGTH};
use wifi_phy::message_queue::MessageQueue;
use wifi_phy::ofdm_decoder::{DecodedPayload, FrameStart, OfdmDecoder, SymbolTag};
use wifi_phy::ofdm_mapper::{FrameEncoder, OfdmFrameEncoder, OfdmMapper};
use wifi_phy::signal_field::{generate_signal_field, parse_signal_field, NB_SIGNAL_CODED_BITS};
use wifi_phy::stream_tags::{FrameTags, StreamTag};
use wifi_phy::symbol_mapper::modulate;
use wifi_phy::viterbi_decoder::ViterbiDecoder;
use wifi_side_channel::bit_errors::BitErrorReport;
use wifi_side_channel::constellation_offset::{OffsetDecoder, OffsetReport, OffsetSettings};
use wifi_side_channel::demo_payload::{cycle_payload, DEMO_SIDE_PAYLOAD};
use wifi_side_channel::sector_varrate::{SectorDecoder, SectorReport};
use wifi_side_channel::side_config::SideChannelConfig;
use wifi_side_channel::vlc::frame::{modulate_frame, VlcFrameDecoder, VlcFrameDecoderSettings, VlcFrameEncoder};
use wifi_side_channel::zero_subcarrier::{ZeroSubcarrierDecoder, ZeroSubcarrierReport, ZeroSubcarrierSettings};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SideChannelKind {
    Disabled,
    Zero,
    Mask,
    Offset,
    Sector,
    Vlc,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct AppArguments {
    /// Primary encoding tag. Valid values are \[0,7\] from BPSK 1/2 to 64QAM 3/4
    #[arg(short, long, default_value_t = 2)]
    encoding: u32,
    /// Side channel that rides on the primary frames
    #[arg(short, long, value_enum, default_value_t = SideChannelKind::Disabled)]
    side_channel: SideChannelKind,
    /// Number of nulled subcarriers per symbol for the zero subcarrier side channel. Valid values are \[1,2\]
    #[arg(long, default_value_t = 1)]
    nb_zeros: usize,
    /// File of little endian f32 pairs used as the fixed amplitude mask
    #[arg(long)]
    mask_filepath: Option<String>,
    /// Side encoding tag for the constellation offset. Valid values are 2 (QPSK 1/2) and 8 (8PSK 1/2)
    #[arg(long, default_value_t = 2)]
    side_encoding: u32,
    /// Constellation offset as a fraction of half the primary minimum distance
    #[arg(long, default_value_t = 0.5)]
    alpha: f32,
    /// Comma separated sector counts for the variable rate sector side channel
    #[arg(long, value_delimiter = ',', default_values_t = vec![3, 3, 2])]
    sectors: Vec<usize>,
    /// Order of the VLC constellation
    #[arg(long, default_value_t = 20)]
    vlc_order: usize,
    /// Number of nearest candidates the VLC marker check may pick from
    #[arg(long, default_value_t = 2)]
    vlc_backup: usize,
    /// Number of frames to send when no input file is given
    #[arg(short, long, default_value_t = 10)]
    nb_frames: usize,
    /// Number of MSDU bytes per frame
    #[arg(short, long, default_value_t = 131)]
    payload_length: usize,
    /// Channel SNR in dB. If not provided the channel is noiseless.
    #[arg(long)]
    snr_db: Option<f32>,
    /// Seed for the channel noise
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Leave the frame check sequence to the mapper instead of the MAC
    #[arg(long)]
    no_fcs: bool,
    /// Input filepath split into MSDUs. If not provided generated messages are sent.
    #[arg(short, long)]
    input_filepath: Option<String>,
    /// Output filepath for decoded MSDUs. If not provided they are discarded.
    #[arg(short, long)]
    output_filepath: Option<String>,
    /// Logging filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// One frame on its way through the simulated channel.
struct AirFrame {
    tags: Vec<StreamTag>,
    signal: Vec<Complex32>,
    data: Vec<Complex32>,
}

#[derive(Debug, Default)]
struct SideStats {
    nb_reports: usize,
    nb_symbol_errors: usize,
    bit_errors: BitErrorReport,
}

impl SideStats {
    fn add_bit_errors(&mut self, report: &BitErrorReport) {
        self.nb_reports += 1;
        self.bit_errors.nb_bit_errors += report.nb_bit_errors;
        self.bit_errors.nb_bits += report.nb_bits;
    }
}

fn main() -> Result<(), String> {
    let args = AppArguments::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .map_err(|err| format!("Invalid log level {}: {}", args.log_level, err))?;
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    // Parse arguments
    let encoding = match Encoding::try_from(args.encoding) {
        Ok(encoding) if encoding.is_primary() => encoding,
        _ => return Err(format!("Invalid primary encoding index {}", args.encoding)),
    };
    let payload_length = match args.payload_length {
        0 => return Err("Payload length cannot be zero.".into()),
        length if length > MAX_MSDU_LENGTH => return Err(format!("Payload length cannot exceed {} bytes.", MAX_MSDU_LENGTH)),
        length => length,
    };
    let side_channel = create_side_channel_config(&args)?;
    side_channel.validate().map_err(|err| format!("Invalid side channel: {}", err))?;
    let messages = load_messages(&args, payload_length)?;
    let mut output_file: Option<Box<dyn Write + Send + Sync>> = match &args.output_filepath {
        None => None,
        Some(filepath) => match std::fs::File::create(filepath) {
            Ok(file) => Some(Box::new(BufWriter::new(file))),
            Err(err) => return Err(format!("Failed to open file {}: {}", filepath, err)),
        },
    };
    let channel = AwgnChannel::new(args.snr_db, args.seed)?;
    info!(%encoding, side_channel = %side_channel, nb_messages = messages.len(), snr_db = ?args.snr_db, "starting simulation");

    // Application in
    let framer = Arc::new(MacFramer::new(MacSettings { include_fcs: !args.no_fcs, ..MacSettings::default() }));
    let mac_queue = Arc::new(MessageQueue::<MacFrame>::new());
    let air_queue = Arc::new(MessageQueue::<AirFrame>::new());
    for message in &messages {
        let frame = framer.frame(message).map_err(|err| format!("Failed to frame message: {}", err))?;
        if let Err(err) = mac_queue.push(frame) {
            return Err(format!("Failed to queue message: {}", err));
        }
    }
    mac_queue.close();

    // Setup threads
    let tx_thread = std::thread::spawn({
        let mac_queue = mac_queue.clone();
        let air_queue = air_queue.clone();
        let side_channel = side_channel.clone();
        move || {
            let result = match &side_channel {
                SideChannelConfig::Vlc { order, .. } => match VlcFrameEncoder::new(*order) {
                    Ok(encoder) => run_transmitter(OfdmMapper::new(encoder, mac_queue), channel, &air_queue, modulate_frame),
                    Err(err) => Err(err),
                },
                _ => match side_channel.create_transmitter(DEMO_SIDE_PAYLOAD) {
                    Ok(transmitter) => {
                        let constellation = Constellation::new(encoding);
                        let mapper = OfdmMapper::new(OfdmFrameEncoder::new(encoding), mac_queue);
                        run_transmitter(mapper, channel, &air_queue, |tags: &[StreamTag], indices: &[u8]| {
                            let mut symbols = vec![Complex32::default(); indices.len()];
                            modulate(&constellation, indices, &mut symbols);
                            transmitter.apply(tags, &mut symbols)?;
                            Ok(symbols)
                        })
                    },
                    Err(err) => Err(err),
                },
            };
            match result {
                Ok(total_frames) => info!("[tx_thread] Finished sending {} frames", total_frames),
                Err(err) => error!("[tx_thread] Transmitter stopped: {}", err),
            }
            air_queue.close();
        }
    });

    let side_stats = Arc::new(Mutex::new(SideStats::default()));
    let nb_payloads = Arc::new(Mutex::new(0usize));
    let rx_thread = std::thread::spawn({
        let air_queue = air_queue.clone();
        let framer = framer.clone();
        let side_stats = side_stats.clone();
        let nb_payloads = nb_payloads.clone();
        let side_channel = side_channel.clone();
        move || {
            let on_payload = move |payload: &DecodedPayload| {
                *nb_payloads.lock().unwrap_or_else(|err| err.into_inner()) += 1;
                let Some(msdu) = framer.strip_header(&payload.psdu) else {
                    warn!("[rx_thread] Decoded PSDU of {} bytes is shorter than the MAC header", payload.psdu.len());
                    return;
                };
                if let Some(file) = output_file.as_mut() {
                    if let Err(err) = file.write_all(msdu) {
                        error!("[rx_thread] Error while writing to output: {}", err);
                    }
                }
            };
            let mut receiver = Receiver::new(&side_channel, side_stats, on_payload);
            while let Ok(frame) = air_queue.pop_blocking() {
                receiver.process(&frame);
            }
            receiver.log_summary();
        }
    });

    if let Err(err) = tx_thread.join() {
        error!("[main_thread] Transmit thread should terminate gracefully: {:?}", err);
    }
    if let Err(err) = rx_thread.join() {
        error!("[main_thread] Receive thread should terminate gracefully: {:?}", err);
    }

    let nb_payloads = *nb_payloads.lock().unwrap_or_else(|err| err.into_inner());
    info!("[main_thread] Received {} of {} messages", nb_payloads, messages.len());
    let side_stats = side_stats.lock().unwrap_or_else(|err| err.into_inner());
    if side_stats.nb_reports > 0 {
        info!(
            nb_reports = side_stats.nb_reports,
            nb_symbol_errors = side_stats.nb_symbol_errors,
            nb_bit_errors = side_stats.bit_errors.nb_bit_errors,
            ber = side_stats.bit_errors.ber(),
            "[main_thread] Side channel summary"
        );
    }
    Ok(())
}

fn create_side_channel_config(args: &AppArguments) -> Result<SideChannelConfig, String> {
    let config = match args.side_channel {
        SideChannelKind::Disabled => SideChannelConfig::Disabled,
        SideChannelKind::Zero => SideChannelConfig::ZeroSubcarrier { nb_zeros: args.nb_zeros },
        SideChannelKind::Mask => {
            let Some(filepath) = &args.mask_filepath else {
                return Err("Fixed mask side channel needs a mask file.".into());
            };
            SideChannelConfig::FixedMask { mask: load_mask(filepath)? }
        },
        SideChannelKind::Offset => {
            let side_encoding = Encoding::try_from(args.side_encoding)
                .map_err(|err| format!("Invalid side encoding: {}", err))?;
            SideChannelConfig::Offset(OffsetSettings { side_encoding, alpha: args.alpha, ..OffsetSettings::default() })
        },
        SideChannelKind::Sector => SideChannelConfig::Sector { sectors: args.sectors.clone() },
        SideChannelKind::Vlc => SideChannelConfig::Vlc { order: args.vlc_order, nb_backup: args.vlc_backup },
    };
    Ok(config)
}

fn load_mask(filepath: &str) -> Result<Vec<Complex32>, String> {
    let bytes = std::fs::read(filepath).map_err(|err| format!("Failed to read mask file {}: {}", filepath, err))?;
    let bytes_per_value = 2*std::mem::size_of::<f32>();
    if bytes.len() % bytes_per_value != 0 {
        return Err(format!("Mask file {} has {} bytes which is not a whole number of complex values", filepath, bytes.len()));
    }
    let mask = bytes
        .chunks_exact(bytes_per_value)
        .map(|x| {
            let re = f32::from_le_bytes([x[0], x[1], x[2], x[3]]);
            let im = f32::from_le_bytes([x[4], x[5], x[6], x[7]]);
            Complex32::new(re, im)
        })
        .collect();
    Ok(mask)
}

fn load_messages(args: &AppArguments, payload_length: usize) -> Result<Vec<Vec<u8>>, String> {
    let Some(filepath) = &args.input_filepath else {
        let messages = (0..args.nb_frames)
            .map(|i| cycle_payload(format!("wifi_phy_sim message {:04} ", i).as_bytes(), payload_length))
            .collect();
        return Ok(messages);
    };
    let mut input_file = match std::fs::File::open(filepath) {
        Ok(file) => file,
        Err(err) => return Err(format!("Failed to open input file {}: {}", filepath, err)),
    };
    let mut bytes = vec![];
    if let Err(err) = input_file.read_to_end(&mut bytes) {
        return Err(format!("Error while reading from input: {}", err));
    }
    Ok(bytes.chunks(payload_length).map(|x| x.to_vec()).collect())
}

/// Runs the mapper until the MAC queue closes and sends every frame through the channel.
fn run_transmitter<E, F>(
    mut mapper: OfdmMapper<E>,
    mut channel: AwgnChannel,
    air_queue: &MessageQueue<AirFrame>,
    mut to_symbols: F,
) -> PhyResult<u32>
where
    E: FrameEncoder,
    F: FnMut(&[StreamTag], &[u8]) -> PhyResult<Vec<Complex32>>,
{
    let mut buf = vec![0u8; 1 << 15];
    let mut tags: Vec<StreamTag> = vec![];
    let mut indices: Vec<u8> = vec![];
    while let Ok(output) = mapper.work(&mut buf) {
        if !output.tags.is_empty() {
            tags = output.tags.iter().map(|x| x.tag).collect();
            indices.clear();
        }
        indices.extend_from_slice(&buf[..output.total_written]);

        let frame = FrameTags::from_tags(&tags)?;
        if indices.len() < frame.packet_len {
            continue;
        }

        let mut signal = vec![0u8; NB_SIGNAL_CODED_BITS];
        generate_signal_field(&OfdmParameters::new(frame.encoding), frame.psdu_len, &mut signal);
        let mut signal_symbols = vec![Complex32::default(); NB_SIGNAL_CODED_BITS];
        modulate(&Constellation::new(Encoding::Bpsk1_2), &signal, &mut signal_symbols);

        let mut data = to_symbols(&tags, &indices)?;
        channel.process(&mut signal_symbols);
        channel.process(&mut data);
        debug!("[tx_thread] Sending frame with {} bytes over {} subcarriers", frame.psdu_len, data.len());
        air_queue.push(AirFrame { tags: tags.clone(), signal: signal_symbols, data })?;
    }
    Ok(mapper.total_frames_sent)
}

enum FrameReceiver {
    Primary(OfdmDecoder),
    Vlc(VlcFrameDecoder),
}

/// Receive side of the simulation, running the decoder that matches the side channel.
struct Receiver {
    frame_receiver: FrameReceiver,
    viterbi: ViterbiDecoder,
    total_signal_errors: u32,
}

impl Receiver {
    fn new(
        side_channel: &SideChannelConfig,
        side_stats: Arc<Mutex<SideStats>>,
        on_payload: impl FnMut(&DecodedPayload) + Send + Sync + 'static,
    ) -> Self {
        let frame_receiver = match side_channel {
            SideChannelConfig::Vlc { nb_backup, .. } => {
                let settings = VlcFrameDecoderSettings { nb_backup: *nb_backup, ..VlcFrameDecoderSettings::default() };
                let mut decoder = VlcFrameDecoder::new(settings);
                decoder.subscribe_payload_out(on_payload);
                FrameReceiver::Vlc(decoder)
            },
            _ => {
                let mut decoder = OfdmDecoder::default();
                decoder.subscribe_payload_out(on_payload);
                add_side_channel_decoder(&mut decoder, side_channel, side_stats);
                FrameReceiver::Primary(decoder)
            },
        };
        Self {
            frame_receiver,
            viterbi: ViterbiDecoder::default(),
            total_signal_errors: 0,
        }
    }

    fn process(&mut self, frame: &AirFrame) {
        let signal = match parse_signal_field(&frame.signal, &mut self.viterbi) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("[rx_thread] Dropping frame with bad SIGNAL field: {}", err);
                self.total_signal_errors += 1;
                return;
            },
        };
        match &mut self.frame_receiver {
            FrameReceiver::Primary(decoder) => {
                let start = FrameStart { psdu_len: signal.psdu_len, encoding: signal.encoding };
                decoder.process(&frame.data, &[SymbolTag { offset: 0, frame: start }]);
            },
            FrameReceiver::Vlc(decoder) => {
                if let Err(err) = decoder.process_frame(&frame.tags, &frame.data) {
                    warn!("[rx_thread] Dropping VLC frame: {}", err);
                }
            },
        }
    }

    fn log_summary(&self) {
        match &self.frame_receiver {
            FrameReceiver::Primary(decoder) => info!(
                total_frames_read = decoder.total_frames_read,
                total_frames_checksum_failed = decoder.total_frames_checksum_failed,
                total_frames_too_large = decoder.total_frames_too_large,
                total_signal_errors = self.total_signal_errors,
                "[rx_thread] Finished decoding"
            ),
            FrameReceiver::Vlc(decoder) => info!(
                total_frames_read = decoder.total_frames_read,
                total_frames_checksum_failed = decoder.total_frames_checksum_failed,
                total_signal_errors = self.total_signal_errors,
                "[rx_thread] Finished decoding"
            ),
        }
    }
}

fn add_side_channel_decoder(decoder: &mut OfdmDecoder, side_channel: &SideChannelConfig, side_stats: Arc<Mutex<SideStats>>) {
    let result = match side_channel {
        SideChannelConfig::ZeroSubcarrier { nb_zeros } => {
            ZeroSubcarrierDecoder::new(ZeroSubcarrierSettings { nb_zeros: *nb_zeros, ..ZeroSubcarrierSettings::default() })
                .map(|mut side_decoder| {
                    side_decoder.subscribe_report_out(move |report: &ZeroSubcarrierReport| {
                        let mut stats = side_stats.lock().unwrap_or_else(|err| err.into_inner());
                        stats.nb_reports += 1;
                        stats.nb_symbol_errors += report.nb_symbol_errors;
                    });
                    decoder.add_side_channel_decoder(Box::new(side_decoder));
                })
        },
        SideChannelConfig::Offset(settings) => OffsetDecoder::new(*settings, DEMO_SIDE_PAYLOAD).map(|mut side_decoder| {
            side_decoder.subscribe_report_out(move |report: &OffsetReport| {
                side_stats.lock().unwrap_or_else(|err| err.into_inner()).add_bit_errors(&report.side_bit_errors);
            });
            decoder.add_side_channel_decoder(Box::new(side_decoder));
        }),
        SideChannelConfig::Sector { sectors } => SectorDecoder::new(sectors, DEMO_SIDE_PAYLOAD).map(|mut side_decoder| {
            side_decoder.subscribe_report_out(move |report: &SectorReport| {
                side_stats.lock().unwrap_or_else(|err| err.into_inner()).add_bit_errors(&report.side_bit_errors);
            });
            decoder.add_side_channel_decoder(Box::new(side_decoder));
        }),
        SideChannelConfig::Disabled | SideChannelConfig::FixedMask { .. } | SideChannelConfig::Vlc { .. } => Ok(()),
    };
    if let Err(err) = result {
        error!("[rx_thread] Failed to create side channel decoder: {}", err);
    }
}
