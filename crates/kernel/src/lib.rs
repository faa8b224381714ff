mod batch;
mod cancel;
mod error;
mod job;
mod poller;
mod report;
mod scheduler;
mod submit;
mod upload;
mod verify;

pub use batch::{BatchJobConfig, CreateBatchJob};
pub use cancel::{cancel_channel, is_cancelled, CancelSignal};
pub use error::JobError;
pub use job::PipelineJob;
pub use poller::{ConfirmationPoller, PollerConfig};
pub use report::JobRunReport;
pub use scheduler::JobRunner;
pub use submit::{SubmitJobConfig, SubmitToBlockchainJob};
pub use upload::{UploadJobConfig, UploadToIpfsJob};
pub use verify::{verify_invoice, BatchInfo, VerificationResult};
