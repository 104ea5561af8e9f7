//! Child side of a test run.
//!
//! The daemon starts `measured run-test <module>` and writes a
//! [`TestInvocation`] to its stdin. The child checks it, reseeds its random
//! state and runs the module to completion.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{error, info};

use super::{ModuleRegistry, TestContext, TestInvocation};

pub const EXIT_MODULE_FAILED: u8 = 1;
pub const EXIT_BAD_INVOCATION: u8 = 2;

/// Entry point for `run-test`
pub async fn run_test(modules: &ModuleRegistry, module_name: &str) -> ExitCode {
    let invocation = match read_invocation(tokio::io::stdin()).await {
        Ok(invocation) => invocation,
        Err(e) => {
            error!(module = module_name, error = %e, "Invalid test invocation");
            return ExitCode::from(EXIT_BAD_INVOCATION);
        }
    };

    let resolver_socket = std::env::var_os(nameservice::SOCKET_ENV).map(PathBuf::from);
    run_invocation(modules, module_name, invocation, resolver_socket).await
}

pub async fn read_invocation<R>(mut reader: R) -> anyhow::Result<TestInvocation>
where
    R: AsyncRead + Unpin,
{
    let mut payload = Vec::new();
    reader.read_to_end(&mut payload).await.context("Failed to read invocation")?;
    serde_json::from_slice(&payload).context("Failed to decode invocation")
}

pub async fn run_invocation(
    modules: &ModuleRegistry,
    module_name: &str,
    invocation: TestInvocation,
    resolver_socket: Option<PathBuf>,
) -> ExitCode {
    let ctx = match prepare(modules, module_name, invocation, resolver_socket) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(module = module_name, error = %e, "Invalid test invocation");
            return ExitCode::from(EXIT_BAD_INVOCATION);
        }
    };

    // Checked in prepare
    let Some(module) = modules.by_name(module_name) else {
        return ExitCode::from(EXIT_BAD_INVOCATION);
    };

    let run_id = ctx.run_id;
    info!(module = module_name, %run_id, destinations = ctx.destinations.len(), "Running test");

    match module.run(ctx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(module = module_name, %run_id, error = %e, "Test failed");
            ExitCode::from(EXIT_MODULE_FAILED)
        }
    }
}

fn prepare(
    modules: &ModuleRegistry,
    module_name: &str,
    invocation: TestInvocation,
    resolver_socket: Option<PathBuf>,
) -> anyhow::Result<TestContext> {
    if modules.by_name(module_name).is_none() {
        bail!("Unknown test module '{module_name}'");
    }
    if invocation.module() != Some(module_name) {
        bail!("Invocation is for {:?}, not {module_name}", invocation.module());
    }
    if invocation.destinations.is_empty() {
        bail!("Invocation has no destinations");
    }

    Ok(TestContext {
        run_id: invocation.run_id,
        args: invocation.args,
        destinations: invocation.destinations,
        resolver_socket,
        // Fresh entropy so runs never share a random sequence
        rng: StdRng::from_entropy(),
    })
}
