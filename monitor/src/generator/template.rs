use ltpcore::ingest::header::{ELAPSED_TIME_MARKER, STEP_SCAN_MARKER, TEMPERATURE_MARKERS};
use ltpcore::ingest::Channel;
use std::fmt::Write as _;

/// 1-based column of the stage position.
pub const POSITION: usize = 2;
/// First autocollimator column; channels follow in [`Channel::ALL`] order.
pub const FIRST_CHANNEL: usize = 3;

pub fn channel_column(channel: Channel) -> usize {
    FIRST_CHANNEL + channel.index()
}

pub fn temperature_column(sensor: usize) -> usize {
    FIRST_CHANNEL + Channel::ALL.len() + sensor
}

pub fn elapsed_column() -> usize {
    temperature_column(TEMPERATURE_MARKERS.len())
}

/// Commented header of a converted step-scan pass, as `mda2ascii` lays it out.
pub fn step_scan_header(id: &str, pass: usize) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "# MDA file: {}.mda, pass {}", id, pass);
    let _ = writeln!(text, "# {}", STEP_SCAN_MARKER);
    let _ = writeln!(text, "#  1  Index");
    let _ = writeln!(text, "# {:>2}  ltpu:m1.VAL", POSITION);
    for channel in Channel::ALL {
        let _ = writeln!(text, "# {:>2}  ltpu:{}", channel_column(channel), channel.marker());
    }
    for (sensor, marker) in TEMPERATURE_MARKERS.iter().enumerate() {
        let _ = writeln!(text, "# {:>2}  {}", temperature_column(sensor), marker);
    }
    let _ = writeln!(text, "# {:>2}  {}", elapsed_column(), ELAPSED_TIME_MARKER);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltpcore::ingest::scan_header;
    use ltpcore::ingest::ScanMode;

    #[test]
    fn header_round_trips_through_the_column_scanner() {
        let text = step_scan_header("ltp_0001", 1);
        let header = scan_header(text.lines()).unwrap();
        assert_eq!(header.mode, Some(ScanMode::Step));
        assert!(header.is_complete());
        assert_eq!(header.column(Channel::Vx).unwrap() + 1, channel_column(Channel::Vx));
        assert_eq!(header.temperature_columns.len(), 5);
        assert_eq!(header.elapsed_time_column.map(|c| c + 1), Some(elapsed_column()));
    }
}
