// Analysis module - DSP pipeline for blow detection
//
// Pipeline per display frame:
//   captured PCM -> FrequencyFilter -> SpectralAnalyzer (byte spectrum)
//   -> SubBandWindow RMS -> BlowClassifier (debounced threshold)

pub mod classifier;
pub mod filter;
pub mod frame;
pub mod spectrum;
