use clap::Parser;

/// Download every S3 object announced on an SNS-fed SQS queue
#[derive(Debug, Parser)]
#[command(name = "s3-drain", version, about)]
pub struct Cli {
    /// Name of the queue receiving the object notifications
    pub queue_name: String,

    /// Leave processed messages on the queue
    #[arg(short, long)]
    pub keep: bool,

    /// Log every processing stage, not only errors
    #[arg(short, long)]
    pub verbose: bool,
}
