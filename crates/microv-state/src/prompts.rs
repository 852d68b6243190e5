//! Fixed instructions sent to the reasoning service and the user-facing
//! strings shown by the client.

/// Sent with every freshly loaded static image
pub const WHOLE_IMAGE: &str = "Analyze this clinical sample image. Describe the sample type, \
the visible elements or cells, and an approximate count of each type, if possible. \
Be concise and objective.";

/// Sent with a manually selected region
pub const REGION: &str = "Describe exactly what is visible in this cropped image. \
Be as specific as possible and identify the object, cell, etc.";

pub const CLINICAL_FINDINGS: &str =
    "Point out the objects or elements of clinical importance visible in this image.";

pub const QUANTITATIVE_COUNT: &str = "Quantitatively list the visible objects or cells and \
express the count as numbers. It does not have to be exact, an approximation is fine.";

pub const PLACEHOLDER: &str = "Analyzing...";

pub const ANALYSIS_ERROR: &str =
    "Error: could not connect to the reasoning service. Please try again.";

/// The two quick-prompt buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickPrompt {
    ClinicalFindings,
    QuantitativeCount,
}

impl QuickPrompt {
    pub fn instruction(self) -> &'static str {
        match self {
            QuickPrompt::ClinicalFindings => CLINICAL_FINDINGS,
            QuickPrompt::QuantitativeCount => QUANTITATIVE_COUNT,
        }
    }
}

pub mod notices {
    pub const UNSUPPORTED_FILE: &str = "Unsupported file type. Please upload a JPG or PNG image.";
    pub const CAMERA_FAILED: &str = "Could not access the camera. Make sure the required permissions have been granted.";
    pub const SELECTION_TOO_SMALL: &str = "Please draw a larger box for the analysis.";
    pub const NO_SOURCE: &str = "Please start the camera or upload an image first.";
    pub const SCAN_NEEDS_SOURCE: &str =
        "This feature requires the camera to be running or a static image to be loaded.";
    pub const STREAMING_ON: &str = "Real-time detection enabled.";
    pub const STREAMING_OFF: &str = "Real-time detection disabled.";
    pub const STREAMING_FAILED: &str = "Could not connect to the real-time annotation service.";
    pub const STREAMING_STALLED: &str = "The real-time annotation service stopped responding.";
    pub const STREAMING_NEEDS_CAMERA: &str = "Real-time detection is only available while the camera is running.";
    pub const NO_SURFACE: &str = "The image is not on screen yet. Please try again.";
    pub const SELECTOR_ON: &str = "Region selection enabled. Draw a box over the image.";
    pub const SELECTOR_OFF: &str = "Region selection disabled.";
    pub const VIDEO_NOT_READY: &str = "The video is not ready for analysis yet.";
    pub const DETECTING: &str = "Analyzing the image with the detector...";
    pub const DETECTION_DONE: &str = "Analysis complete!";
    pub const DETECTION_FAILED: &str = "Error connecting to the analysis service.";
}
