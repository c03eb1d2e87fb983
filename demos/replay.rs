//! Replay a synthetic typing session and print the resulting analyses

use calmtrace::pipeline::{parse_events, ReplayProcessor};

fn main() {
    let mut lines = Vec::new();
    // a calm stretch of typing followed by a burst of corrections
    for i in 0..40 {
        let t = 1_000 + i * 250;
        lines.push(format!(r#"{{"type": "key_down", "timestamp_ms": {t}, "key_code": 29}}"#));
        lines.push(format!(r#"{{"type": "key_up", "timestamp_ms": {}}}"#, t + 90));
    }
    lines.push(r#"{"type": "analyze", "timestamp_ms": 12000}"#.to_string());
    for i in 0..30 {
        let t = 20_000 + i * 120;
        let key_code = if i % 3 == 0 { 67 } else { 29 };
        lines.push(format!(r#"{{"type": "key_down", "timestamp_ms": {t}, "key_code": {key_code}}}"#));
        lines.push(format!(
            r#"{{"type": "touch", "timestamp_ms": {t}, "phase": "down", "x": 10, "y": 10, "pressure": 0.85}}"#
        ));
    }
    lines.push(r#"{"type": "analyze", "timestamp_ms": 25000}"#.to_string());

    let events = match parse_events(&lines.join("\n")) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("Error: {e}");
            return;
        }
    };

    let mut processor = ReplayProcessor::default();
    match processor.process_all(&events) {
        Ok(analyses) => {
            for analysis in analyses {
                match serde_json::to_string(&analysis) {
                    Ok(json) => println!("{json}"),
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
        }
        Err(e) => eprintln!("Error: {e:?}"),
    }
}
