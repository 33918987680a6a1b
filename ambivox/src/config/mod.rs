mod audio_desc;

pub use audio_desc::{AmbienceDesc, AudioDesc};
