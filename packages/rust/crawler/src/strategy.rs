//! Strategy plans: each rung of the ladder as a plain configuration record.

use std::time::Duration;

use crawlq_shared::{CrawlqError, Result, Strategy};
use url::Url;

use crate::navigate;

/// Timing and navigation parameters for one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyPlan {
    pub strategy: Strategy,
    /// Hard limit for the whole attempt.
    pub timeout: Duration,
    /// Wait after the first page load.
    pub settle: Duration,
    /// Wait after clicking through from the home page.
    pub after_click: Duration,
}

impl StrategyPlan {
    pub fn for_strategy(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Direct => Self {
                strategy,
                timeout: Duration::from_secs(30),
                settle: Duration::from_secs(1),
                after_click: Duration::ZERO,
            },
            Strategy::SpaWithDelay => Self {
                strategy,
                timeout: Duration::from_secs(60),
                settle: Duration::from_secs(5),
                after_click: Duration::ZERO,
            },
            Strategy::NavigateFromHome => Self {
                strategy,
                timeout: Duration::from_secs(60),
                settle: Duration::from_secs(3),
                after_click: Duration::from_secs(4),
            },
        }
    }
}

/// How the fetcher reaches the target page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Load the target URL itself.
    Direct,
    /// Load `home`, then follow the link that points at the target.
    FromHome { home: Url },
}

/// Everything a [`crate::PageFetcher`] needs for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub target: Url,
    pub navigation: Navigation,
    pub plan: StrategyPlan,
}

impl FetchRequest {
    /// Build the request `strategy` makes for `target`.
    ///
    /// Fails for navigate-from-home when the target is the site root, since
    /// there is no distinct home page to click from.
    pub fn for_strategy(strategy: Strategy, target: &Url) -> Result<Self> {
        let navigation = match strategy {
            Strategy::Direct | Strategy::SpaWithDelay => Navigation::Direct,
            Strategy::NavigateFromHome => {
                if navigate::is_site_root(target) {
                    return Err(CrawlqError::Navigation(format!(
                        "{target} is the site root; no home page to navigate from"
                    )));
                }
                Navigation::FromHome {
                    home: navigate::home_url(target),
                }
            }
        };

        Ok(Self {
            target: target.clone(),
            navigation,
            plan: StrategyPlan::for_strategy(strategy),
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.plan.strategy
    }
}
