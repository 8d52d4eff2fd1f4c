use std::collections::VecDeque;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use base64::Engine as _;
use parking_lot::Mutex;
use scanscribe_core::audio::AudioSource;
use scanscribe_core::engine::protocol;
use scanscribe_core::error::{Result, ScanscribeError};
use scanscribe_core::tones::ToneDetectionParams;
use scanscribe_core::validate::ProbeOutcome;
use scanscribe_core::{
    SpeechBackend, StructuralProbe, ToneDetection, ToneDetector, ToneEvent, TranscriptSegment,
    TranscriptionParams, Worker, WorkerSettings,
};
use serde_json::Value;

const QUIET: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct Call {
    params: TranscriptionParams,
    inline_rate: Option<u32>,
}

/// Backend double: pops scripted replies, records every call.
struct ScriptedBackend {
    replies: VecDeque<Reply>,
    calls: Arc<Mutex<Vec<Call>>>,
}

enum Reply {
    Text(&'static str),
    Fail(&'static str),
    Panic,
}

impl ScriptedBackend {
    fn new(replies: Vec<Reply>) -> (Self, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                replies: replies.into(),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl SpeechBackend for ScriptedBackend {
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    fn transcribe(
        &mut self,
        audio: &AudioSource,
        params: &TranscriptionParams,
    ) -> Result<Vec<TranscriptSegment>> {
        let inline_rate = match audio {
            AudioSource::Samples(chunk) => Some(chunk.sample_rate),
            AudioSource::File(_) => None,
        };
        self.calls.lock().push(Call {
            params: params.clone(),
            inline_rate,
        });
        match self.replies.pop_front() {
            None | Some(Reply::Text("")) => Ok(Vec::new()),
            Some(Reply::Text(t)) => Ok(vec![TranscriptSegment::text(t)]),
            Some(Reply::Fail(msg)) => Err(ScanscribeError::Backend(msg.into())),
            Some(Reply::Panic) => panic!("decoder state corrupted"),
        }
    }
}

struct AcceptAll;

impl StructuralProbe for AcceptAll {
    fn probe(&self, _path: &Path, _timeout: Duration) -> ProbeOutcome {
        ProbeOutcome::Ok
    }
}

struct FixedDetector {
    events: Vec<ToneEvent>,
    calls: Arc<Mutex<usize>>,
}

impl ToneDetector for FixedDetector {
    fn detect(&mut self, _path: &Path, _params: &ToneDetectionParams) -> Result<ToneDetection> {
        *self.calls.lock() += 1;
        Ok(ToneDetection {
            events: self.events.clone(),
        })
    }
}

fn worker(backend: ScriptedBackend, detector: Option<FixedDetector>) -> Worker {
    Worker::new(
        Box::new(backend),
        detector.map(|d| Box::new(d) as Box<dyn ToneDetector>),
        Box::new(AcceptAll),
        WorkerSettings::default(),
    )
}

fn run(worker: &mut Worker, input: &str, heartbeat: Duration) -> Vec<String> {
    let mut out = Vec::new();
    protocol::run(worker, Cursor::new(input.as_bytes().to_vec()), &mut out, heartbeat)
        .expect("loop ends cleanly at EOF");
    String::from_utf8(out)
        .expect("utf8 output")
        .lines()
        .map(str::to_owned)
        .collect()
}

fn silent_wav(seconds: f32) -> tempfile::NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".wav")
        .tempfile()
        .expect("temp wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(file.path(), spec).expect("wav writer");
    for _ in 0..(16_000.0 * seconds) as usize {
        writer.write_sample(0i16).expect("sample");
    }
    writer.finalize().expect("finalize");
    file
}

fn job(id: &str, command: &str, path: &Path) -> String {
    serde_json::json!({"id": id, "command": command, "path": path}).to_string()
}

#[test]
fn ready_is_first_and_only_once() {
    let (backend, _) = ScriptedBackend::new(vec![]);
    let lines = run(&mut worker(backend, None), "", QUIET);
    assert_eq!(lines, vec![r#"{"ready":true}"#]);
}

#[test]
fn silent_clip_is_retried_and_answered_empty() {
    let clip = silent_wav(2.0);
    let (backend, calls) = ScriptedBackend::new(vec![Reply::Text(""), Reply::Text("")]);
    let mut w = worker(backend, None);

    let lines = run(&mut w, &format!("{}\n", job("1", "transcribe", clip.path())), QUIET);
    assert_eq!(lines[1], r#"{"id":"1","transcription":""}"#);

    let calls = calls.lock();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].params.vad_filter);
    assert_eq!(calls[1].params, calls[0].params.without_vad());
    assert_eq!(w.diagnostics().second_passes, 1);
}

#[test]
fn missing_file_is_an_error_with_the_same_id() {
    let (backend, calls) = ScriptedBackend::new(vec![]);
    let lines = run(
        &mut worker(backend, None),
        "{\"id\":\"2\",\"command\":\"transcribe\",\"path\":\"/missing.wav\"}\n",
        QUIET,
    );
    assert_eq!(
        lines[1],
        r#"{"id":"2","error":"Audio file does not exist: /missing.wav"}"#
    );
    assert!(calls.lock().is_empty());
}

#[test]
fn directory_path_never_reaches_backend() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (backend, calls) = ScriptedBackend::new(vec![Reply::Text("should not run")]);
    let lines = run(
        &mut worker(backend, None),
        &format!("{}\n", job("d1", "transcribe", dir.path())),
        QUIET,
    );
    assert_eq!(
        lines[1],
        format!(
            r#"{{"id":"d1","error":"Audio file does not exist: {}"}}"#,
            dir.path().display()
        )
    );
    assert!(calls.lock().is_empty());
}

#[test]
fn two_tone_hit_is_flattened() {
    let clip = silent_wav(1.0);
    let (backend, _) = ScriptedBackend::new(vec![]);
    let detector_calls = Arc::new(Mutex::new(0));
    let detector = FixedDetector {
        events: vec![ToneEvent::TwoTone {
            tone_a: 1000.0,
            tone_b: 1500.0,
            duration_a: None,
            duration_b: None,
        }],
        calls: Arc::clone(&detector_calls),
    };

    let lines = run(
        &mut worker(backend, Some(detector)),
        &format!("{}\n", job("3", "detect_tones", clip.path())),
        QUIET,
    );
    let expected = format!(
        r#"{{"id":"3","has_two_tone":true,"detected_tones":[{{"tone_a":1000.0,"tone_b":1500.0}}],"file_path":{}}}"#,
        serde_json::to_string(&clip.path().display().to_string()).expect("json string")
    );
    assert_eq!(lines[1], expected);
    assert_eq!(*detector_calls.lock(), 1);
}

#[test]
fn garbage_and_id_less_lines_are_dropped_silently() {
    let clip = silent_wav(1.0);
    let (backend, _) = ScriptedBackend::new(vec![Reply::Text("Engine 7 on scene")]);
    let mut w = worker(backend, None);
    let input = format!(
        "not json\n\n   \n{{\"command\":\"transcribe\",\"path\":\"/a.wav\"}}\n{}\n",
        job("4", "transcribe", clip.path())
    );

    let lines = run(&mut w, &input, QUIET);
    assert_eq!(lines.len(), 2, "got {lines:?}");
    assert_eq!(lines[1], r#"{"id":"4","transcription":"Engine 7 on scene"}"#);
    assert_eq!(w.diagnostics().lines_dropped, 2);
}

#[test]
fn undersized_file_never_reaches_backend() {
    let mut tiny = tempfile::NamedTempFile::new().expect("temp");
    tiny.write_all(&[0u8; 200]).expect("write");
    let (backend, calls) = ScriptedBackend::new(vec![]);

    let lines = run(
        &mut worker(backend, None),
        &format!("{}\n", job("5", "transcribe", tiny.path())),
        QUIET,
    );
    assert_eq!(lines[1], r#"{"id":"5","error":"Audio file too small: 200 bytes"}"#);
    assert!(calls.lock().is_empty());
}

#[test]
fn same_job_twice_builds_identical_first_pass() {
    let clip = silent_wav(1.0);
    let (backend, calls) = ScriptedBackend::new(vec![Reply::Text("a"), Reply::Text("b")]);
    let line = job("6", "transcribe", clip.path());
    run(&mut worker(backend, None), &format!("{line}\n{line}\n"), QUIET);

    let calls = calls.lock();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].params, calls[1].params);
}

#[test]
fn invalid_command_is_answered() {
    let (backend, _) = ScriptedBackend::new(vec![]);
    let lines = run(
        &mut worker(backend, None),
        "{\"id\":\"7\",\"command\":\"translate\",\"path\":\"/a.wav\"}\n{\"id\":\"8\",\"command\":\"transcribe\"}\n",
        QUIET,
    );
    assert_eq!(lines[1], r#"{"id":"7","error":"Invalid command: translate"}"#);
    assert_eq!(
        lines[2],
        r#"{"id":"8","error":"Invalid command format: missing 'path' or 'audio_data_base64'."}"#
    );
}

#[test]
fn backend_failures_are_classified() {
    let clip = silent_wav(1.0);
    let (backend, _) = ScriptedBackend::new(vec![
        Reply::Fail("[Errno 1094995529] Invalid data found when processing input"),
        Reply::Fail("out of memory allocating encoder buffer"),
        Reply::Fail("model exploded"),
    ]);
    let input: String = ["a", "b", "c"]
        .iter()
        .map(|id| format!("{}\n", job(id, "transcribe", clip.path())))
        .collect();

    let lines = run(&mut worker(backend, None), &input, QUIET);
    assert_eq!(lines[1], r#"{"id":"a","error":"Corrupt audio data for ID a."}"#);
    assert_eq!(
        lines[2],
        r#"{"id":"b","error":"Out of memory during transcription for ID b."}"#
    );
    assert_eq!(
        lines[3],
        r#"{"id":"c","error":"Error during transcription for ID c: model exploded"}"#
    );
}

#[test]
fn panic_in_a_stage_is_contained() {
    let clip = silent_wav(1.0);
    let (backend, _) = ScriptedBackend::new(vec![Reply::Panic, Reply::Text("still here")]);
    let mut w = worker(backend, None);
    let input = format!(
        "{}\n{}\n",
        job("p1", "transcribe", clip.path()),
        job("p2", "transcribe", clip.path())
    );

    let lines = run(&mut w, &input, QUIET);
    assert_eq!(
        lines[1],
        r#"{"id":"p1","error":"Unexpected server error: decoder state corrupted"}"#
    );
    assert_eq!(lines[2], r#"{"id":"p2","transcription":"still here"}"#);
    assert_eq!(w.diagnostics().panics_caught, 1);
}

#[test]
fn inline_audio_is_decoded_to_model_rate() {
    let clip = {
        let file = tempfile::NamedTempFile::new().expect("temp");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(file.path(), spec).expect("writer");
        for _ in 0..8_000 {
            writer.write_sample(1_000i16).expect("l");
            writer.write_sample(1_000i16).expect("r");
        }
        writer.finalize().expect("finalize");
        std::fs::read(file.path()).expect("read wav")
    };
    let payload = base64::engine::general_purpose::STANDARD.encode(clip);
    let (backend, calls) = ScriptedBackend::new(vec![Reply::Text("copy")]);

    let line = serde_json::json!({"id": "in", "command": "transcribe", "audio_data_base64": payload});
    let lines = run(&mut worker(backend, None), &format!("{line}\n"), QUIET);

    assert_eq!(lines[1], r#"{"id":"in","transcription":"copy"}"#);
    assert_eq!(calls.lock()[0].inline_rate, Some(16_000));
}

#[test]
fn inline_tone_job_is_refused() {
    let (backend, _) = ScriptedBackend::new(vec![]);
    let calls = Arc::new(Mutex::new(0));
    let detector = FixedDetector {
        events: Vec::new(),
        calls: Arc::clone(&calls),
    };
    let lines = run(
        &mut worker(backend, Some(detector)),
        "{\"id\":\"t\",\"command\":\"detect_tones\",\"audio_data_base64\":\"AAAA\"}\n",
        QUIET,
    );
    assert_eq!(
        lines[1],
        r#"{"id":"t","error":"Tone detection requires 'path' parameter."}"#
    );
    assert_eq!(*calls.lock(), 0);
}

#[test]
fn uninstalled_detector_is_reported() {
    let clip = silent_wav(1.0);
    let (backend, _) = ScriptedBackend::new(vec![]);
    let lines = run(
        &mut worker(backend, None),
        &format!("{}\n", job("u", "detect_tones", clip.path())),
        QUIET,
    );
    assert_eq!(
        lines[1],
        r#"{"id":"u","error":"Tone detection is not available. Please install icad-tone-detection."}"#
    );
}

/// Yields scripted chunks, sleeping before each one.
struct PacedReader {
    chunks: VecDeque<(Duration, Vec<u8>)>,
}

impl Read for PacedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let Some((pause, mut chunk)) = self.chunks.pop_front() else {
            return Ok(0);
        };
        thread::sleep(pause);
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front((Duration::ZERO, chunk.split_off(n)));
        }
        Ok(n)
    }
}

#[test]
fn heartbeat_only_after_idle_and_jobs_reset_the_timer() {
    let (backend, _) = ScriptedBackend::new(vec![]);
    let mut w = worker(backend, None);
    let line = |id: &str| {
        format!("{{\"id\":\"{id}\",\"command\":\"transcribe\",\"path\":\"/missing.wav\"}}\n").into_bytes()
    };
    let reader = PacedReader {
        chunks: VecDeque::from(vec![
            (Duration::ZERO, line("h1")),
            (Duration::from_millis(20), line("h2")),
            (Duration::from_millis(400), line("h3")),
        ]),
    };

    let mut out = Vec::new();
    protocol::run(&mut w, BufReader::new(reader), &mut out, Duration::from_millis(250))
        .expect("loop");
    let lines: Vec<Value> = String::from_utf8(out)
        .expect("utf8")
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();

    assert_eq!(lines.len(), 5, "got {lines:?}");
    assert_eq!(lines[0]["ready"], true);
    assert_eq!(lines[1]["id"], "h1");
    assert_eq!(lines[2]["id"], "h2");
    assert_eq!(lines[3]["heartbeat"], true);
    assert!(lines[3]["timestamp"].as_f64().expect("timestamp") > 0.0);
    assert_eq!(lines[4]["id"], "h3");
    assert_eq!(w.diagnostics().heartbeats, 1);
}
