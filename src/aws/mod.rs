//! AWS service clients

pub mod context;
pub mod ec2;
pub mod route53;
pub mod tags;

pub use context::AwsContext;
pub use ec2::{CreatedKeyPair, Ec2Api, Ec2Client};
pub use route53::{Route53Api, Route53Client};
