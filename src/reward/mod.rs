//! Reward requests and their approval.

mod core;
mod endpoints;

pub use core::{
    NewReward, Reward, RewardStatus, RewardUpdate, create_reward, create_reward_table,
    get_reward, list_rewards, update_reward_status,
};
pub use endpoints::{
    RewardState, create_reward_endpoint, get_reward_endpoint, list_rewards_endpoint,
    update_reward_endpoint,
};
