use std::collections::VecDeque;
use tracing::debug;

use crate::models::chat::{Message, Role};
use crate::utils::error::{MemoryError, MemoryResult};

use super::token_counter::CostEstimator;
use super::types::{WindowConfig, WindowStrategy};

/// Messages presented as context for one generation call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Window {
    pub messages: Vec<Message>,
    /// Pinned cost plus the cost of the selected conversation messages
    pub cost: usize,
}

/// Selects the window from a full session log.
///
/// Pure: the log is only read, and the result depends only on the log, the
/// config, and the estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowPolicy {
    config: WindowConfig,
}

impl WindowPolicy {
    pub fn new(config: WindowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn select(
        &self,
        log: &[Message],
        estimator: &dyn CostEstimator,
    ) -> MemoryResult<Vec<Message>> {
        self.select_window(log, estimator).map(|w| w.messages)
    }

    pub fn select_window(
        &self,
        log: &[Message],
        estimator: &dyn CostEstimator,
    ) -> MemoryResult<Window> {
        let WindowConfig {
            budget,
            strategy,
            include_system,
        } = self.config;

        if log.is_empty() {
            return Ok(Window::default());
        }

        let pinned = match strategy {
            WindowStrategy::KeepLastWithSystemPinned if include_system => {
                log.iter().rev().find(|m| m.role().is_system())
            }
            _ => None,
        };

        // Pinned messages are never dropped, even when they alone blow the budget
        let mut pinned_cost = 0;
        let mut remaining = budget;
        if let Some(system) = pinned {
            pinned_cost = estimate(estimator, std::slice::from_ref(system))?;
            remaining = remaining.saturating_sub(pinned_cost);
        }

        let competes_for_budget = |m: &&Message| match m.role() {
            Role::System => strategy == WindowStrategy::KeepLast && include_system,
            Role::Human | Role::Assistant => true,
        };

        // Newest first. An over-budget candidate is skipped, not a stop signal:
        // an older, smaller message may still fit.
        let mut selected: VecDeque<Message> = VecDeque::new();
        let mut selected_cost = 0;
        for candidate in log.iter().filter(competes_for_budget).rev() {
            if selected_cost >= remaining {
                break;
            }

            selected.push_front(candidate.clone());
            let cost = estimate(estimator, selected.make_contiguous())?;
            if cost <= remaining {
                selected_cost = cost;
            } else {
                selected.pop_front();
            }
        }

        let mut messages = Vec::with_capacity(selected.len() + 1);
        if let Some(system) = pinned {
            messages.push(system.clone());
        }
        messages.extend(selected);

        debug!(
            "Window selected: {} of {} messages, cost {} (pinned {}) of budget {}",
            messages.len(),
            log.len(),
            pinned_cost + selected_cost,
            pinned_cost,
            budget
        );

        Ok(Window {
            messages,
            cost: pinned_cost + selected_cost,
        })
    }
}

fn estimate(estimator: &dyn CostEstimator, messages: &[Message]) -> MemoryResult<usize> {
    estimator
        .estimate(messages)
        .map_err(MemoryError::EstimationFailed)
}
