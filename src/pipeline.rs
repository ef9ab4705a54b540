use image::DynamicImage;
use std::sync::Arc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender, Receiver};
use anyhow::Result;

use crate::error::CoinError;

/// Bounding box in the original image
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Data that flows through the pipeline.
/// Before circle detection an item is the whole photo; afterwards each item
/// is one coin with its circle parameters in the metadata.
#[derive(Clone)]
pub struct PipelineData {
    /// Working image (grayscale/edges before detection, coin crop after)
    pub image: DynamicImage,

    /// The untouched input photo, shared by every item
    pub original: Arc<DynamicImage>,

    /// Region of the original this item covers (None means full image)
    pub bbox: Option<BoundingBox>,

    /// Step outputs such as "radius", "coin_kind", "blur_sigma"
    pub metadata: HashMap<String, MetadataValue>,
}

/// Metadata value types
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Bool(bool),
    Float(f32),
    String(String),
    Int(i32),
}

impl PipelineData {
    /// Create PipelineData for a full image
    pub fn from_image(image: DynamicImage) -> Self {
        let original = Arc::new(image.clone());
        Self {
            image,
            original,
            bbox: None,
            metadata: HashMap::new(),
        }
    }

    /// Create PipelineData for a region of an image
    pub fn from_region(
        image: DynamicImage,
        original: Arc<DynamicImage>,
        bbox: BoundingBox,
    ) -> Self {
        Self {
            image,
            original,
            bbox: Some(bbox),
            metadata: HashMap::new(),
        }
    }

    /// Same item with a different working image
    pub fn with_image(&self, image: DynamicImage) -> Self {
        Self {
            image,
            original: self.original.clone(),
            bbox: self.bbox.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: MetadataValue) {
        self.metadata.insert(key.into(), value);
    }

    /// Get metadata as bool
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.metadata.get(key) {
            Some(MetadataValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get metadata as float
    pub fn get_float(&self, key: &str) -> Option<f32> {
        match self.metadata.get(key) {
            Some(MetadataValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get metadata as int
    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.metadata.get(key) {
            Some(MetadataValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get metadata as string
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.metadata.get(key) {
            Some(MetadataValue::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Float metadata a step cannot work without
    pub fn require_float(&self, key: &'static str, step: &'static str) -> Result<f32, CoinError> {
        self.get_float(key).ok_or(CoinError::MissingMetadata { key, step })
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    /// Whether debug mode is enabled
    pub enabled: bool,
}

/// Context available to all pipeline steps
#[derive(Clone, Default)]
pub struct PipelineContext {
    pub debug: Option<DebugConfig>,
}

impl PipelineContext {
    fn debug_dir(&self) -> Option<&Path> {
        self.debug
            .as_ref()
            .filter(|d| d.enabled)
            .map(|d| d.output_dir.as_path())
    }
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Process data and return transformed data
    /// Steps can split data (1 → many), filter (many → fewer), or transform (many → many)
    fn process(&self, data: Vec<PipelineData>, context: &PipelineContext) -> Result<Vec<PipelineData>>;

    /// Human-readable name for this step (used in logs and debug folders)
    fn name(&self) -> &str;
}

fn step_dir_name(index: usize, step_name: &str) -> String {
    format!("{:02}_{}", index, step_name.to_lowercase().replace(' ', "_"))
}

fn save_debug_image(image: &DynamicImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .map_err(|e| anyhow::anyhow!("Failed to save debug image {}: {}", path.display(), e))
}

/// Work item for pipeline execution
/// Contains data and the remaining steps to execute
#[derive(Clone)]
pub struct WorkItem {
    /// The data to process
    pub data: PipelineData,

    /// Remaining pipeline steps (steps not yet executed)
    pub remaining_steps: Vec<Arc<dyn PipelineStep>>,

    /// Step index (for tracking progress)
    pub current_step_index: usize,

    /// Lineage: IDs from previous steps that led to this item
    /// E.g., [1, 3, 2] means: item 1 from step 0 → item 3 from step 1 → item 2 from step 2
    pub lineage: Vec<usize>,
}

impl WorkItem {
    /// Create a new work item
    pub fn new(data: PipelineData, steps: Vec<Arc<dyn PipelineStep>>) -> Self {
        Self {
            data,
            remaining_steps: steps,
            current_step_index: 0,
            lineage: vec![],
        }
    }

    /// Check if this work item is complete (no more steps)
    pub fn is_complete(&self) -> bool {
        self.remaining_steps.is_empty()
    }

    /// Generate filename from lineage (e.g., "01-03-02.png")
    pub fn lineage_filename(&self, extension: &str) -> String {
        if self.lineage.is_empty() {
            format!("01.{}", extension)
        } else {
            let ids: Vec<String> = self.lineage.iter().map(|id| format!("{:02}", id)).collect();
            format!("{}.{}", ids.join("-"), extension)
        }
    }

    /// Save debug output if debug mode is enabled
    fn save_debug_output(&self, context: &PipelineContext, step_name: &str) -> Result<()> {
        let Some(root) = context.debug_dir() else {
            return Ok(());
        };

        let dir_name = step_dir_name(self.current_step_index, step_name);
        let step_dir = root.join(&dir_name);
        std::fs::create_dir_all(&step_dir)?;

        let filename = self.lineage_filename("png");
        save_debug_image(&self.data.image, &step_dir.join(&filename))?;
        tracing::debug!("Debug: saved {}/{}", dir_name, filename);

        Ok(())
    }

    /// Run the next step and create new work items for the remaining steps
    pub fn process_next_step(&mut self, context: &PipelineContext) -> Result<Vec<WorkItem>> {
        if self.remaining_steps.is_empty() {
            return Ok(vec![]);
        }

        let step = self.remaining_steps[0].clone();
        let remaining_after = self.remaining_steps[1..].to_vec();
        let step_name = step.name();

        // A step may split 1 item into many or drop it
        let results = step.process(vec![self.data.clone()], context)?;

        let mut new_items = Vec::new();
        for (idx, result_data) in results.into_iter().enumerate() {
            let mut new_lineage = self.lineage.clone();
            new_lineage.push(idx + 1); // 1-indexed for readability

            let new_item = WorkItem {
                data: result_data,
                remaining_steps: remaining_after.clone(),
                current_step_index: self.current_step_index + 1,
                lineage: new_lineage,
            };

            new_item.save_debug_output(context, step_name)?;
            new_items.push(new_item);
        }

        Ok(new_items)
    }
}

/// Pipeline executor using MPSC channel for work distribution
pub struct PipelineExecutor {
    sender: Sender<WorkItem>,
    receiver: Receiver<WorkItem>,
    context: PipelineContext,
}

impl PipelineExecutor {
    /// Create a new executor
    pub fn new(context: PipelineContext) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            context,
        }
    }

    /// Execute the pipeline by processing work items from the channel
    pub fn execute(&self, initial_items: Vec<WorkItem>) -> Result<Vec<PipelineData>> {
        let mut pending_count = 0usize;
        for item in initial_items {
            self.sender.send(item)
                .map_err(|e| anyhow::anyhow!("Failed to send work item: {}", e))?;
            pending_count += 1;
        }

        let mut completed_results = Vec::new();

        while pending_count > 0 {
            match self.receiver.try_recv() {
                Ok(mut item) => {
                    pending_count -= 1;

                    if item.is_complete() {
                        completed_results.push(item.data);
                    } else {
                        for new_item in item.process_next_step(&self.context)? {
                            self.sender.send(new_item)
                                .map_err(|e| anyhow::anyhow!("Failed to send work item: {}", e))?;
                            pending_count += 1;
                        }
                    }
                }
                Err(mpsc::TryRecvError::Empty) => {
                    std::thread::yield_now();
                }
                Err(mpsc::TryRecvError::Disconnected) => {
                    break;
                }
            }
        }

        Ok(completed_results)
    }
}

/// Composable pipeline builder
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::default(),
        }
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig {
            output_dir,
            enabled: true,
        });

        Ok(self)
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Helper method to add a step from a Box (for convenience)
    pub fn add_step_boxed(mut self, step: Box<dyn PipelineStep>) -> Self {
        self.steps.push(Arc::from(step));
        self
    }

    /// Names of the configured steps, in order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    fn save_debug_input(&self, input: &DynamicImage) -> Result<()> {
        if let Some(root) = self.context.debug_dir() {
            let input_dir = root.join("00_input");
            std::fs::create_dir_all(&input_dir)?;
            save_debug_image(input, &input_dir.join("01.png"))?;
            tracing::debug!("Debug: saved 00_input/01.png");
        }
        Ok(())
    }

    /// Run the pipeline step by step on the whole batch
    pub fn run(&self, input: DynamicImage) -> Result<Vec<PipelineData>> {
        self.run_partial(input, self.steps.len())
    }

    /// Run the pipeline using the executor with work queue
    pub fn run_with_executor(&self, input: DynamicImage) -> Result<Vec<PipelineData>> {
        self.save_debug_input(&input)?;

        let initial_data = PipelineData::from_image(input);
        let initial_item = WorkItem::new(initial_data, self.steps.clone());

        let executor = PipelineExecutor::new(self.context.clone());
        executor.execute(vec![initial_item])
    }

    /// Run the pipeline but stop after `num_steps` steps (useful for debugging)
    pub fn run_partial(&self, input: DynamicImage, num_steps: usize) -> Result<Vec<PipelineData>> {
        self.save_debug_input(&input)?;

        let mut data = vec![PipelineData::from_image(input)];

        for (step_idx, step) in self.steps.iter().take(num_steps).enumerate() {
            tracing::debug!("Running step {}: {} (processing {} items)", step_idx + 1, step.name(), data.len());

            data = step.process(data, &self.context)?;

            if let Some(root) = self.context.debug_dir() {
                let dir_name = step_dir_name(step_idx + 1, step.name());
                let step_dir = root.join(&dir_name);
                std::fs::create_dir_all(&step_dir)?;

                for (idx, item) in data.iter().enumerate() {
                    save_debug_image(&item.image, &step_dir.join(format!("{:02}.png", idx + 1)))?;
                }
                tracing::debug!("Debug: saved {} images to {}/", data.len(), dir_name);
            }

            tracing::debug!("  → {} items", data.len());
        }

        Ok(data)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
