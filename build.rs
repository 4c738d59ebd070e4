fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");

    // Messages are plain prost structs in src/grpc/proto.rs, so only the
    // service plumbing is generated here and no protoc is required.
    let method = |name: &str, route: &str, input: &str| {
        tonic_build::manual::Method::builder()
            .name(name)
            .route_name(route)
            .input_type(&format!("crate::grpc::proto::{}", input))
            .output_type("crate::grpc::proto::CheckResponse")
            .codec_path("tonic::codec::ProstCodec")
            .build()
    };

    let service = tonic_build::manual::Service::builder()
        .name("LimiterService")
        .package("turnstile.v1")
        .method(method("check_rate", "CheckRate", "CheckRateRequest"))
        .method(method("check_quota", "CheckQuota", "CheckQuotaRequest"))
        .build();

    tonic_build::manual::Builder::new().compile(&[service]);

    Ok(())
}
