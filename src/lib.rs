//! seqctl - tagged lifecycle manager for Sequencer cloud resources
//!
//! Provisions and tears down the small set of cloud resources one logical
//! deployment needs: compute instances, key pairs, and DNS A records. Every
//! resource carries the deployment ownership tag; every listing call filters
//! on it; every mutation checks what already exists before touching the
//! provider.
//!
//! ## Modules
//!
//! - [`instance`]: create / terminate / list / fetch compute instances
//! - [`key`]: key pairs with their local private key files
//! - [`dns`]: A records inside their owning hosted zone
//! - [`wait`]: readiness barrier polling a fresh instance until it runs
//! - [`aws`]: SDK client wrappers behind mockable traits
//! - [`error`]: the closed Warning/Error failure taxonomy
//! - [`config`]: layered flags > environment > file configuration

pub mod aws;
pub mod config;
pub mod dns;
pub mod error;
pub mod instance;
pub mod key;
pub mod wait;
