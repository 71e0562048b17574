//! Single process-wide browser manager with serialized relaunch.
//!
//! Exactly one browser instance is kept running; it is relaunched only
//! when its launch flags (headless, proxy) differ from the instance
//! currently running, under one lock so concurrent callers observing a
//! mismatched browser wait for the relaunch rather than racing it.

use crate::config::{get_chrome_args, Config, DeviceProfile, DEVICE_PROFILES};
use crate::error::EngineError;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const STEALTH_INIT_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', {get: () => undefined});
window.chrome = { runtime: {} };
Object.defineProperty(navigator, 'plugins', {get: () => [1, 2, 3, 4, 5]});
Object.defineProperty(navigator, 'languages', {get: () => ['en-US', 'en']});
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
struct LaunchFlags {
    headless: bool,
    proxy: Option<String>,
}

struct Running {
    browser: Browser,
    handler: tokio::task::JoinHandle<()>,
    flags: LaunchFlags,
}

/// An isolated browsing session: a single page within the shared browser
/// process, stamped with a randomly chosen device profile.
pub struct Context {
    pub page: Page,
    pub profile: DeviceProfile,
}

pub struct BrowserManager {
    config: Config,
    running: Mutex<Option<Running>>,
}

impl BrowserManager {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            running: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Launch (or relaunch, if `headless`/`proxy` differ from the current
    /// instance) the shared browser, serialized under the manager's lock.
    async fn ensure_browser<'a>(
        &self,
        guard: &mut tokio::sync::MutexGuard<'a, Option<Running>>,
        headless: bool,
        proxy: Option<&str>,
    ) -> Result<(), EngineError> {
        let wanted = LaunchFlags {
            headless,
            proxy: proxy.map(|s| s.to_string()),
        };

        let needs_relaunch = match guard.as_ref() {
            None => true,
            Some(running) => running.flags != wanted,
        };

        if !needs_relaunch {
            return Ok(());
        }

        if let Some(running) = guard.take() {
            let _ = running.browser.close().await;
            running.handler.abort();
        }

        let mut local_config = self.config.clone();
        local_config.headless = headless;

        let args = get_chrome_args(&local_config, proxy);
        let browser_config = BrowserConfig::builder()
            .args(args)
            .build()
            .unwrap_or_else(|_| BrowserConfig::with_executable("/usr/bin/chromium"));

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| EngineError::BrowserUnavailable(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("browser handler error: {e}");
                    break;
                }
            }
            info!("browser handler stream ended");
        });

        info!("browser (re)launched, headless={headless}, proxy={proxy:?}");
        **guard = Some(Running {
            browser,
            handler: handler_task,
            flags: wanted,
        });

        Ok(())
    }

    /// Return a fresh context, relaunching the browser first if needed.
    /// Retries once on `new_page` failure.
    pub async fn get_context(&self, headless: bool, proxy: Option<&str>) -> Result<Context, EngineError> {
        let mut guard = self.running.lock().await;
        self.ensure_browser(&mut guard, headless, proxy).await?;

        match self.new_page(&guard).await {
            Ok(page) => Ok(self.stamp_context(page).await),
            Err(e) => {
                warn!("new_page failed ({e}), relaunching browser once");
                if let Some(running) = guard.take() {
                    let _ = running.browser.close().await;
                    running.handler.abort();
                }
                self.ensure_browser(&mut guard, headless, proxy).await?;
                let page = self
                    .new_page(&guard)
                    .await
                    .map_err(|e| EngineError::RenderError(e.to_string()))?;
                Ok(self.stamp_context(page).await)
            }
        }
    }

    async fn new_page(
        &self,
        guard: &tokio::sync::MutexGuard<'_, Option<Running>>,
    ) -> Result<Page, EngineError> {
        let running = guard.as_ref().ok_or_else(|| EngineError::BrowserUnavailable("not running".to_string()))?;
        running
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| EngineError::RenderError(e.to_string()))
    }

    async fn stamp_context(&self, page: Page) -> Context {
        let profile = *DEVICE_PROFILES.choose(&mut rand::thread_rng()).unwrap();
        let mut jitter = rand::thread_rng();
        let width = (profile.width as i32 + jitter.gen_range(-40..=40)).max(1) as u32;
        let height = (profile.height as i32 + jitter.gen_range(-40..=40)).max(1) as u32;

        if let Ok(params) = SetDeviceMetricsOverrideParams::builder()
            .width(width)
            .height(height)
            .device_scale_factor(1.0)
            .mobile(profile.name == "Mobile Android")
            .build()
        {
            let _ = page.execute(params).await;
        }

        let _ = page
            .set_user_agent(SetUserAgentOverrideParams::new(profile.user_agent))
            .await;

        let _ = page
            .execute(AddScriptToEvaluateOnNewDocumentParams {
                source: STEALTH_INIT_SCRIPT.to_string(),
                include_command_line_api: None,
                world_name: None,
                run_immediately: None,
            })
            .await;

        Context { page, profile }
    }

    /// Close a context. Idempotent — closing an already-closed page is a
    /// no-op error we swallow.
    pub async fn release(&self, context: Context) {
        let _ = context.page.close().await;
    }

    pub async fn shutdown(&self) {
        let mut guard = self.running.lock().await;
        if let Some(running) = guard.take() {
            info!("closing shared browser");
            let _ = running.browser.close().await;
            running.handler.abort();
        }
    }
}
