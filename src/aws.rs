use aws_config::{meta::region::RegionProviderChain, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};
use aws_sdk_sesv2::Client as SesClient;

use crate::config::AppConfig;

pub async fn load_sdk_config(config: &AppConfig) -> SdkConfig {
    let region = Region::new(config.aws_region.clone());
    let region_provider = RegionProviderChain::first_try(Some(region))
        .or_default_provider()
        .or_else("us-east-1");

    #[allow(deprecated)]
    let mut loader = aws_config::from_env().region(region_provider);

    if let Some(endpoint) = &config.aws_endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (
        config.aws_access_key_id.clone(),
        config.aws_secret_access_key.clone(),
    ) {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");
        loader = loader.credentials_provider(credentials);
    }

    loader.load().await
}

pub fn build_s3_client(sdk_config: &SdkConfig) -> S3Client {
    let s3_config = S3ConfigBuilder::from(sdk_config)
        .force_path_style(true)
        .build();

    S3Client::from_conf(s3_config)
}

pub fn build_ses_client(sdk_config: &SdkConfig) -> SesClient {
    SesClient::new(sdk_config)
}
