//! Hand-off to an external vision-language recognizer
//!
//! The recognizer itself lives outside this crate. `MeterReader` owns the
//! client it is given, so no process-wide model handle is needed.

use crate::error::{MeterError, Result};
use crate::preprocessing::{ImagePayload, Pipeline, PipelineInput, PreprocessingResult, Rotation};
use std::sync::Arc;

/// Default system instruction for meter-reading questions
pub const METER_SYSTEM_PROMPT: &str = "You are a specialist in comprehending electricity meter readings. \
Input images in the form of electricity meter readings will be provided to you, \
and your task is to respond to questions based on the content of the input image.";

/// Question asking for the meter's serial number
pub const METER_NUMBER_QUESTION: &str = "What is the meter number in the image?";

/// Question asking for the consumption reading
pub const METER_READING_QUESTION: &str = "What is the electricity meter reading in the image?";

/// Everything the recognizer needs for one question
#[derive(Debug, Clone, Copy)]
pub struct RecognitionRequest<'a> {
    pub system_prompt: &'a str,
    pub image: &'a ImagePayload,
    pub question: &'a str,
}

/// Trait that external recognizers implement
pub trait Recognizer: Send + Sync {
    /// Returns the recognizer identifier
    fn name(&self) -> &'static str;

    /// Answer a question about the image, or fail with a provider error
    fn answer(&self, request: &RecognitionRequest<'_>) -> Result<String>;
}

/// Answer from a recognizer together with the preprocessing that fed it
#[derive(Debug, Clone)]
pub struct MeterReading {
    pub answer: String,
    pub recognizer: &'static str,
    pub preprocessing: PreprocessingResult,
}

/// Meter number and reading extracted from one photo
///
/// `None` means the recognizer gave no usable answer: an empty meter number,
/// or a reading identical to the meter number.
#[derive(Debug, Clone)]
pub struct MeterReport {
    pub meter_number: Option<String>,
    pub reading: Option<String>,
    pub recognizer: &'static str,
    pub preprocessing: PreprocessingResult,
}

/// Preprocesses meter photos and asks a recognizer about them
pub struct MeterReader {
    pipeline: Pipeline,
    recognizer: Arc<dyn Recognizer>,
    system_prompt: String,
}

impl MeterReader {
    pub fn new(pipeline: Pipeline, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            pipeline,
            recognizer,
            system_prompt: METER_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Preprocess `input`, encode it and ask `question`
    ///
    /// Recognizer failures are returned as `Recognition` errors without retry.
    pub fn read(
        &self,
        input: PipelineInput,
        rotation: Rotation,
        question: &str,
    ) -> Result<MeterReading> {
        let preprocessing = self.pipeline.process(input, rotation)?;
        let image = preprocessing.encode(self.pipeline.config().output)?;
        let answer = self.ask(&image, question)?;

        tracing::info!(
            "Recognizer '{}' answered in {} chars after {}ms of preprocessing",
            self.recognizer.name(),
            answer.len(),
            preprocessing.total_time_ms
        );

        Ok(MeterReading {
            answer,
            recognizer: self.recognizer.name(),
            preprocessing,
        })
    }

    /// Ask for the meter number, then for the reading
    ///
    /// The image is preprocessed and encoded once. The reading question is
    /// skipped when no meter number comes back.
    pub fn report(&self, input: PipelineInput, rotation: Rotation) -> Result<MeterReport> {
        let preprocessing = self.pipeline.process(input, rotation)?;
        let image = preprocessing.encode(self.pipeline.config().output)?;

        let number = self.ask(&image, METER_NUMBER_QUESTION)?;
        let (meter_number, reading) = if number.is_empty() {
            (None, None)
        } else {
            let reading = self.ask(&image, METER_READING_QUESTION)?;
            let reading = (reading != number).then_some(reading);
            (Some(number), reading)
        };

        tracing::info!(
            "Recognizer '{}' found meter number: {}, reading: {}",
            self.recognizer.name(),
            meter_number.is_some(),
            reading.is_some()
        );

        Ok(MeterReport {
            meter_number,
            reading,
            recognizer: self.recognizer.name(),
            preprocessing,
        })
    }

    fn ask(&self, image: &ImagePayload, question: &str) -> Result<String> {
        let request = RecognitionRequest {
            system_prompt: &self.system_prompt,
            image,
            question,
        };

        let answer = self.recognizer.answer(&request).map_err(|e| match e {
            MeterError::Recognition(_) => e,
            other => MeterError::Recognition(other.to_string()),
        })?;
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRecognizer {
        calls: AtomicUsize,
        seen: Mutex<Vec<(String, String, String)>>,
    }

    impl Recognizer for RecordingRecognizer {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn answer(&self, request: &RecognitionRequest<'_>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((
                request.system_prompt.to_string(),
                request.image.mime_type.clone(),
                request.question.to_string(),
            ));
            Ok("  Day: 01234 kWh \n".to_string())
        }
    }

    struct FailingRecognizer {
        calls: AtomicUsize,
    }

    impl Recognizer for FailingRecognizer {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn answer(&self, _request: &RecognitionRequest<'_>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(MeterError::Internal("quota exceeded".to_string()))
        }
    }

    /// Answers by question, falling back to an empty string
    struct ScriptedRecognizer {
        number: &'static str,
        reading: &'static str,
        questions: Mutex<Vec<String>>,
    }

    impl ScriptedRecognizer {
        fn new(number: &'static str, reading: &'static str) -> Self {
            Self {
                number,
                reading,
                questions: Mutex::new(Vec::new()),
            }
        }
    }

    impl Recognizer for ScriptedRecognizer {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn answer(&self, request: &RecognitionRequest<'_>) -> Result<String> {
            self.questions
                .lock()
                .unwrap()
                .push(request.question.to_string());
            Ok(match request.question {
                METER_NUMBER_QUESTION => self.number,
                METER_READING_QUESTION => self.reading,
                _ => "",
            }
            .to_string())
        }
    }

    fn meter_photo() -> PipelineInput {
        GrayImage::from_fn(32, 32, |x, y| Luma([(40 + x * 4 + y) as u8])).into()
    }

    #[test]
    fn test_reader_sends_prompt_and_jpeg() {
        let recognizer = Arc::new(RecordingRecognizer::default());
        let reader = MeterReader::new(Pipeline::default(), recognizer.clone());

        let reading = reader
            .read(meter_photo(), Rotation::None, "What is the day reading?")
            .unwrap();

        assert_eq!(reading.answer, "Day: 01234 kWh");
        assert_eq!(reading.recognizer, "recording");
        assert_eq!(reading.preprocessing.image.dimensions(), (32, 32));

        let seen = recognizer.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, METER_SYSTEM_PROMPT);
        assert_eq!(seen[0].1, "image/jpeg");
        assert_eq!(seen[0].2, "What is the day reading?");
    }

    #[test]
    fn test_custom_system_prompt() {
        let recognizer = Arc::new(RecordingRecognizer::default());
        let reader = MeterReader::new(Pipeline::default(), recognizer.clone())
            .with_system_prompt("Read the gas meter.");

        reader.read(meter_photo(), Rotation::Left, "Reading?").unwrap();

        assert_eq!(recognizer.seen.lock().unwrap()[0].0, "Read the gas meter.");
    }

    #[test]
    fn test_provider_error_surfaces_without_retry() {
        let recognizer = Arc::new(FailingRecognizer {
            calls: AtomicUsize::new(0),
        });
        let reader = MeterReader::new(Pipeline::default(), recognizer.clone());

        let err = reader
            .read(meter_photo(), Rotation::None, "Reading?")
            .unwrap_err();

        assert!(matches!(err, MeterError::Recognition(_)));
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_preprocessing_failure_skips_recognizer() {
        let recognizer = Arc::new(RecordingRecognizer::default());
        let reader = MeterReader::new(Pipeline::default(), recognizer.clone());
        let tiny: PipelineInput = GrayImage::new(2, 2).into();

        assert!(matches!(
            reader.read(tiny, Rotation::None, "Reading?"),
            Err(MeterError::InvalidParameter(_))
        ));
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_report_asks_number_then_reading() {
        let recognizer = Arc::new(ScriptedRecognizer::new("SN 4471-0923", "Day: 01234 kWh"));
        let reader = MeterReader::new(Pipeline::default(), recognizer.clone());

        let report = reader.report(meter_photo(), Rotation::None).unwrap();

        assert_eq!(report.meter_number.as_deref(), Some("SN 4471-0923"));
        assert_eq!(report.reading.as_deref(), Some("Day: 01234 kWh"));
        assert_eq!(report.recognizer, "scripted");
        assert_eq!(
            *recognizer.questions.lock().unwrap(),
            [METER_NUMBER_QUESTION, METER_READING_QUESTION]
        );
    }

    #[test]
    fn test_report_without_meter_number_skips_reading() {
        let recognizer = Arc::new(ScriptedRecognizer::new("  ", "Day: 01234 kWh"));
        let reader = MeterReader::new(Pipeline::default(), recognizer.clone());

        let report = reader.report(meter_photo(), Rotation::None).unwrap();

        assert!(report.meter_number.is_none());
        assert!(report.reading.is_none());
        assert_eq!(recognizer.questions.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_report_drops_reading_that_repeats_number() {
        let recognizer = Arc::new(ScriptedRecognizer::new("4471-0923", "4471-0923\n"));
        let reader = MeterReader::new(Pipeline::default(), recognizer);

        let report = reader.report(meter_photo(), Rotation::Left).unwrap();

        assert_eq!(report.meter_number.as_deref(), Some("4471-0923"));
        assert!(report.reading.is_none());
    }

    #[test]
    fn test_report_surfaces_provider_error() {
        let recognizer = Arc::new(FailingRecognizer {
            calls: AtomicUsize::new(0),
        });
        let reader = MeterReader::new(Pipeline::default(), recognizer.clone());

        assert!(matches!(
            reader.report(meter_photo(), Rotation::None),
            Err(MeterError::Recognition(_))
        ));
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    }
}
