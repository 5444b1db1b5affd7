//! Stub [`InterviewHook`]: the interactive session that produces an
//! input segment file is treated as an external generator this crate
//! doesn't implement. This default implementation only prints the
//! hand-off message a real generator would replace; it never blocks
//! on stdin.

use std::path::Path;

use gpexpand_core::error::GpResult;
use gpexpand_core::traits::InterviewHook;

pub struct StubInterviewHook;

impl InterviewHook for StubInterviewHook {
    fn run(&self, hosts_file: Option<&Path>) -> GpResult<()> {
        match hosts_file {
            Some(path) => println!(
                "No input file or in-progress expansion found. Run the interactive \
                 segment-configuration generator against {} to produce one, then re-run \
                 with -i.",
                path.display()
            ),
            None => println!(
                "No input file or in-progress expansion found, and no -f hosts file was \
                 given. Pass -i <file> with a prepared input segment file, or -f <hosts-file> \
                 to drive the interactive generator."
            ),
        }
        Ok(())
    }
}
