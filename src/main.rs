use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    vvf_fax_lib::run().await
}
