//! Stable Diffusion WebUI / Forge HTTP backend
//!
//! Talks to the `/sdapi/v1` JSON API. Whole-room generation goes through
//! `txt2img` with a ControlNet canny unit fed our own edge map; masked edits
//! go through `img2img` with an inpainting mask and, in stage mode, an
//! IP-Adapter unit carrying the reference product.

use crate::{
    config::BackendConfig,
    error::{LuminaError, Result},
    inference::{ControlledGenerateRequest, GenerationBackend, InpaintRequest},
    services::ImageIOService,
};
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const BACKEND_NAME: &str = "webui";

/// Fill the masked area from the original pixels before denoising
const INPAINT_FILL_ORIGINAL: u8 = 1;

#[derive(Debug, Serialize)]
struct ControlNetUnit {
    enabled: bool,
    image: String,
    module: String,
    model: String,
    weight: f32,
    pixel_perfect: bool,
}

#[derive(Debug, Serialize)]
struct ControlNetScript {
    args: Vec<ControlNetUnit>,
}

#[derive(Debug, Serialize)]
struct AlwaysOnScripts {
    controlnet: ControlNetScript,
}

#[derive(Debug, Serialize)]
struct Txt2ImgPayload<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    cfg_scale: f32,
    steps: u32,
    width: u32,
    height: u32,
    sampler_name: &'a str,
    alwayson_scripts: AlwaysOnScripts,
}

#[derive(Debug, Serialize)]
struct Img2ImgPayload<'a> {
    init_images: Vec<String>,
    mask: String,
    prompt: &'a str,
    negative_prompt: &'a str,
    cfg_scale: f32,
    steps: u32,
    width: u32,
    height: u32,
    sampler_name: &'a str,
    denoising_strength: f32,
    inpainting_fill: u8,
    inpaint_full_res: bool,
    mask_blur: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    alwayson_scripts: Option<AlwaysOnScripts>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// HTTP client for a WebUI-compatible server
#[derive(Debug, Clone)]
pub struct WebUiBackend {
    client: Client,
    config: BackendConfig,
}

impl WebUiBackend {
    /// Create a backend client
    ///
    /// # Errors
    /// - The HTTP client cannot be built
    pub fn new(config: BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LuminaError::network_error("Failed to create HTTP client", e))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/sdapi/v1/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn controlnet_canny_unit(&self, conditioning: &DynamicImage) -> Result<ControlNetUnit> {
        Ok(ControlNetUnit {
            enabled: true,
            image: ImageIOService::encode_png_base64(conditioning)?,
            // Edge map is computed locally, so no preprocessor runs server-side
            module: "none".to_string(),
            model: self.config.controlnet_canny_model.clone(),
            weight: 1.0,
            pixel_perfect: true,
        })
    }

    fn ip_adapter_unit(&self, reference: &DynamicImage) -> Result<ControlNetUnit> {
        Ok(ControlNetUnit {
            enabled: true,
            image: ImageIOService::encode_png_base64(reference)?,
            module: self.config.ip_adapter_module.clone(),
            model: self.config.ip_adapter_model.clone(),
            weight: self.config.ip_adapter_weight,
            pixel_perfect: false,
        })
    }

    async fn post<P: Serialize + Sync>(&self, operation: &str, path: &str, payload: &P) -> Result<DynamicImage> {
        let url = self.endpoint(path);
        let mut request = self.client.post(&url).json(payload);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| {
                LuminaError::generation_with_backend(
                    BACKEND_NAME,
                    operation,
                    &format!("request to {} failed: {}", url, e),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LuminaError::generation_with_backend(
                BACKEND_NAME,
                operation,
                &format!("HTTP {}: {}", status, body.trim()),
            ));
        }

        let parsed: ImagesResponse = response.json().await.map_err(|e| {
            LuminaError::generation_with_backend(BACKEND_NAME, operation, &format!("malformed response: {}", e))
        })?;

        let first = parsed.images.first().ok_or_else(|| {
            LuminaError::generation_with_backend(BACKEND_NAME, operation, "response contained no images")
        })?;

        ImageIOService::decode_base64(first, "backend output").map_err(|e| {
            LuminaError::generation_with_backend(BACKEND_NAME, operation, &e.to_string())
        })
    }
}

#[async_trait]
impl GenerationBackend for WebUiBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    #[instrument(skip(self, request), fields(steps = request.steps, reference = request.reference.is_some()))]
    async fn inpaint(&self, request: &InpaintRequest) -> Result<DynamicImage> {
        let (width, height) = request.image.dimensions();
        let alwayson_scripts = match &request.reference {
            Some(reference) => Some(AlwaysOnScripts {
                controlnet: ControlNetScript {
                    args: vec![self.ip_adapter_unit(reference)?],
                },
            }),
            None => None,
        };

        let payload = Img2ImgPayload {
            init_images: vec![ImageIOService::encode_png_base64(&request.image)?],
            mask: ImageIOService::encode_png_base64(&DynamicImage::ImageLuma8(request.mask.clone()))?,
            prompt: &request.prompt.positive,
            negative_prompt: &request.prompt.negative,
            cfg_scale: request.prompt.guidance_scale,
            steps: request.steps,
            width,
            height,
            sampler_name: &self.config.sampler_name,
            denoising_strength: 1.0,
            inpainting_fill: INPAINT_FILL_ORIGINAL,
            inpaint_full_res: false,
            mask_blur: self.config.mask_blur,
            alwayson_scripts,
        };

        debug!(width, height, "Submitting img2img inpainting request");
        self.post("Inpainting", "img2img", &payload).await
    }

    #[instrument(skip(self, request), fields(steps = request.steps))]
    async fn generate(&self, request: &ControlledGenerateRequest) -> Result<DynamicImage> {
        let (width, height) = request.conditioning.dimensions();
        let conditioning = DynamicImage::ImageLuma8(request.conditioning.clone());

        let payload = Txt2ImgPayload {
            prompt: &request.prompt.positive,
            negative_prompt: &request.prompt.negative,
            cfg_scale: request.prompt.guidance_scale,
            steps: request.steps,
            width,
            height,
            sampler_name: &self.config.sampler_name,
            alwayson_scripts: AlwaysOnScripts {
                controlnet: ControlNetScript {
                    args: vec![self.controlnet_canny_unit(&conditioning)?],
                },
            },
        };

        debug!(width, height, "Submitting txt2img ControlNet request");
        self.post("Generation", "txt2img", &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SynthesizedPrompt;
    use image::GrayImage;

    fn backend() -> WebUiBackend {
        WebUiBackend::new(BackendConfig {
            base_url: "http://gpu-box:7860/".to_string(),
            ..BackendConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_cleanly() {
        assert_eq!(backend().endpoint("img2img"), "http://gpu-box:7860/sdapi/v1/img2img");
    }

    #[test]
    fn test_img2img_payload_shape() {
        let backend = backend();
        let prompt = SynthesizedPrompt {
            positive: "empty room".to_string(),
            negative: "furniture".to_string(),
            guidance_scale: 7.5,
        };
        let image = DynamicImage::new_rgb8(16, 8);
        let payload = Img2ImgPayload {
            init_images: vec![ImageIOService::encode_png_base64(&image).unwrap()],
            mask: ImageIOService::encode_png_base64(&DynamicImage::ImageLuma8(GrayImage::new(16, 8))).unwrap(),
            prompt: &prompt.positive,
            negative_prompt: &prompt.negative,
            cfg_scale: prompt.guidance_scale,
            steps: 30,
            width: 16,
            height: 8,
            sampler_name: &backend.config.sampler_name,
            denoising_strength: 1.0,
            inpainting_fill: INPAINT_FILL_ORIGINAL,
            inpaint_full_res: false,
            mask_blur: 4,
            alwayson_scripts: None,
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["prompt"], "empty room");
        assert_eq!(json["cfg_scale"], 7.5);
        assert!(json.get("alwayson_scripts").is_none());
        assert_eq!(json["init_images"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_ip_adapter_unit_uses_configured_model() {
        let backend = backend();
        let unit = backend.ip_adapter_unit(&DynamicImage::new_rgb8(4, 4)).unwrap();
        let json = serde_json::to_value(&unit).unwrap();
        assert_eq!(json["model"], "ip-adapter_sd15");
        assert_eq!(json["module"], "ip-adapter_clip_sd15");
        assert!(json["enabled"].as_bool().unwrap());
    }

    #[test]
    fn test_canny_unit_skips_server_preprocessing() {
        let backend = backend();
        let unit = backend
            .controlnet_canny_unit(&DynamicImage::ImageLuma8(GrayImage::new(4, 4)))
            .unwrap();
        assert_eq!(unit.module, "none");
        assert_eq!(unit.model, "control_v11p_sd15_canny");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_generation_error() {
        // Reserve a port, then free it so nothing is listening there
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let backend = WebUiBackend::new(BackendConfig {
            base_url: format!("http://127.0.0.1:{}", port),
            ..BackendConfig::default()
        })
        .unwrap();
        let request = ControlledGenerateRequest {
            prompt: SynthesizedPrompt {
                positive: "room".to_string(),
                negative: String::new(),
                guidance_scale: 7.5,
            },
            conditioning: GrayImage::new(8, 8),
            steps: 1,
        };

        let error = backend.generate(&request).await.unwrap_err();
        match &error {
            LuminaError::Generation(message) => {
                assert!(message.contains("webui"));
                assert!(message.contains(&format!("127.0.0.1:{}", port)));
            },
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(error.status_code(), 502);
    }

    #[test]
    fn test_images_response_parsing() {
        let parsed: ImagesResponse =
            serde_json::from_str(r#"{"images": ["abc"], "parameters": {}, "info": "{}"}"#).unwrap();
        assert_eq!(parsed.images, vec!["abc".to_string()]);

        let empty: ImagesResponse = serde_json::from_str(r#"{"detail": "Not Found"}"#).unwrap();
        assert!(empty.images.is_empty());
    }
}
