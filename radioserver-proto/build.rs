use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    // IqData is written by hand in src/iq.rs so its sample payload can be a
    // `bytes::Bytes` shared with the server's buffer pool.
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .extern_path(".radioserver.IqData", "crate::iq::IqData")
        .file_descriptor_set_path(out_dir.join("radioserver_descriptor.bin"))
        .compile_protos(&["proto/radioserver.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/radioserver.proto");

    Ok(())
}
