//! Music theory helpers: pitch names, keys and scales, chord symbols.

pub mod chord;
pub mod key;
pub mod pitch;

pub use chord::{
    chord_count, distinct_chord_count, has_dark_marker, realize_numeral, realize_progression,
    split_progression,
};
pub use key::{Key, Mode, Scale};
pub use pitch::{midi_to_note_name, parse_note_name, parse_pitch_class};
