use super::test_helpers::*;
use super::*;
use crate::archive::MemoryEngine;
use crate::error::Error;
use crate::types::{Event, JobMetadata, JobStatus, NewJob, Protocol};
use std::path::PathBuf;
use std::time::Duration;

mod http;
