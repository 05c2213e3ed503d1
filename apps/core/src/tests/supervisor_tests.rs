//! Supervisor Tests
//!
//! Session ownership, atomic commits and per-session serialization.

use super::actor_tests::{fenced, Call, ScriptedLlm};
use crate::actors::messages::{AppError, BackendError};
use crate::actors::supervisor::SupervisorHandle;
use crate::brain::analyzer::ClassifierKind;
use crate::brain::intent::Intent;
use crate::config::AppConfig;
use crate::models::Role;
use futures::future::join_all;
use std::sync::Arc;

fn keyword_config() -> AppConfig {
    AppConfig {
        classifier: ClassifierKind::Keyword,
        ..AppConfig::default()
    }
}

fn calculator_llm() -> ScriptedLlm {
    ScriptedLlm::new()
        .reply(Call::Generate, &fenced("python", "class Calculator:  # A"))
        .reply(Call::Optimize, &fenced("python", "class Calculator:  # A'"))
}

#[cfg(test)]
mod session_tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_turn_records_two_turns() {
        let llm = Arc::new(calculator_llm());
        let supervisor = SupervisorHandle::new_with_actors(llm.clone(), keyword_config());

        let outcome = supervisor
            .process_turn("s1".into(), "生成一个计算器类".into(), None)
            .await
            .unwrap();
        assert_eq!(outcome.action, Intent::Generate);

        let history = supervisor.history("s1".into()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "生成一个计算器类");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, outcome.response_text);
        assert_eq!(
            history[1].metadata.as_ref().and_then(|m| m.action),
            Some(Intent::Generate)
        );
    }

    #[tokio::test]
    async fn test_second_turn_builds_on_first() {
        let llm = Arc::new(calculator_llm());
        let supervisor = SupervisorHandle::new_with_actors(llm.clone(), keyword_config());

        supervisor
            .process_turn("s1".into(), "生成一个计算器类".into(), None)
            .await
            .unwrap();
        supervisor
            .process_turn("s1".into(), "添加日志功能".into(), None)
            .await
            .unwrap();

        let second = &llm.requests(Call::Generate)[1].messages;
        // system + the two recorded turns + the new request
        assert_eq!(second.len(), 4);
        assert_eq!(second[1].content, "生成一个计算器类");
        assert!(second[3].content.contains("class Calculator:  # A'"));
        assert_eq!(supervisor.history("s1".into()).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_clear_forgets_turns_and_code() {
        let llm = Arc::new(calculator_llm());
        let supervisor = SupervisorHandle::new_with_actors(llm.clone(), keyword_config());

        supervisor
            .process_turn("s1".into(), "生成一个计算器类".into(), None)
            .await
            .unwrap();
        supervisor.clear_session("s1".into()).await.unwrap();
        assert!(supervisor.history("s1".into()).await.unwrap().is_empty());

        let outcome = supervisor
            .process_turn("s1".into(), "优化一下性能".into(), None)
            .await
            .unwrap();
        assert!(outcome.artifact.is_none());
        assert_eq!(llm.count(Call::Optimize), 1);
    }

    #[tokio::test]
    async fn test_switch_model_clears_and_applies() {
        let llm = Arc::new(calculator_llm().reply(Call::Chat, "hi"));
        let supervisor = SupervisorHandle::new_with_actors(llm.clone(), keyword_config());

        supervisor
            .process_turn("s1".into(), "生成一个计算器类".into(), None)
            .await
            .unwrap();
        let model = supervisor
            .switch_model("s1".into(), "DeepSeek V3".into())
            .await
            .unwrap();
        assert_eq!(model, "deepseek-ai/DeepSeek-V3");
        assert!(supervisor.history("s1".into()).await.unwrap().is_empty());

        supervisor.process_turn("s1".into(), "你好".into(), None).await.unwrap();
        assert_eq!(llm.requests(Call::Chat)[0].model, "deepseek-ai/DeepSeek-V3");
        assert_eq!(llm.requests(Call::Generate)[0].model, "deepseek-ai/DeepSeek-V3.1-Terminus");
    }

    #[tokio::test]
    async fn test_switch_to_unknown_model_fails() {
        let supervisor = SupervisorHandle::new_with_actors(Arc::new(ScriptedLlm::new()), keyword_config());
        let result = supervisor.switch_model("s1".into(), "gpt-2".into()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_per_turn_model_override() {
        let llm = Arc::new(ScriptedLlm::new().reply(Call::Chat, "hi"));
        let supervisor = SupervisorHandle::new_with_actors(llm.clone(), keyword_config());

        supervisor
            .process_turn("s1".into(), "你好".into(), Some("DeepSeek V3".into()))
            .await
            .unwrap();
        supervisor.process_turn("s1".into(), "你好".into(), None).await.unwrap();

        let models: Vec<String> = llm.requests(Call::Chat).into_iter().map(|r| r.model).collect();
        assert_eq!(models, ["deepseek-ai/DeepSeek-V3", "deepseek-ai/DeepSeek-V3.1-Terminus"]);
    }

    #[tokio::test]
    async fn test_list_models_in_configured_order() {
        let supervisor = SupervisorHandle::new_with_actors(Arc::new(ScriptedLlm::new()), keyword_config());
        let names: Vec<String> = supervisor.list_models().into_iter().map(|m| m.display_name).collect();
        assert_eq!(names, ["DeepSeek V3.1 Terminus", "DeepSeek V3"]);
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_turn_leaves_memory_untouched() {
        let llm = Arc::new(ScriptedLlm::new().fail(Call::Chat, BackendError::Network("down".into())));
        let supervisor = SupervisorHandle::new_with_actors(llm, keyword_config());

        let result = supervisor.process_turn("s1".into(), "什么是闭包？".into(), None).await;
        assert!(result.is_err());
        assert!(supervisor.history("s1".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_degraded_turn_is_not_recorded() {
        let llm = Arc::new(ScriptedLlm::new().fail(Call::Classify, BackendError::Network("down".into())));
        let config = AppConfig {
            classifier: ClassifierKind::Model,
            ..AppConfig::default()
        };
        let supervisor = SupervisorHandle::new_with_actors(llm, config);

        let outcome = supervisor
            .process_turn("s1".into(), "生成一个计算器类".into(), None)
            .await
            .unwrap();
        assert!(outcome.degraded);
        assert!(supervisor.history("s1".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_turn_is_recorded() {
        let supervisor = SupervisorHandle::new_with_actors(Arc::new(ScriptedLlm::new()), keyword_config());

        let outcome = supervisor.process_turn("s1".into(), "asdf qwer".into(), None).await.unwrap();
        assert_eq!(outcome.action, Intent::Unknown);
        assert_eq!(supervisor.history("s1".into()).await.unwrap().len(), 2);
    }
}

#[cfg(test)]
mod concurrency_tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_run_in_parallel() {
        let llm = Arc::new(ScriptedLlm::new().reply(Call::Chat, "ok").with_delay(20));
        let supervisor = SupervisorHandle::new_with_actors(llm.clone(), keyword_config());

        let turns = (0..8).map(|i| {
            let supervisor = supervisor.clone();
            async move {
                supervisor
                    .process_turn(format!("session-{}", i), "你好".into(), None)
                    .await
            }
        });
        let results = join_all(turns).await;

        assert!(results.iter().all(|r| r.is_ok()));
        for i in 0..8 {
            let history = supervisor.history(format!("session-{}", i)).await.unwrap();
            assert_eq!(history.len(), 2);
        }
        assert_eq!(llm.count(Call::Chat), 8);
    }

    #[tokio::test]
    async fn test_turns_of_one_session_never_interleave() {
        let llm = Arc::new(ScriptedLlm::new().reply(Call::Chat, "ok").with_delay(10));
        let supervisor = SupervisorHandle::new_with_actors(llm.clone(), keyword_config());

        let turns = ["你好", "什么是闭包？", "为什么用 Rust？"].map(|text| {
            let supervisor = supervisor.clone();
            async move { supervisor.process_turn("shared".into(), text.into(), None).await }
        });
        join_all(turns).await;

        let history = supervisor.history("shared".into()).await.unwrap();
        assert_eq!(history.len(), 6);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
        }
        // each turn saw every turn committed before it
        let seen: Vec<usize> = llm
            .requests(Call::Chat)
            .iter()
            .map(|r| r.messages.len())
            .collect();
        assert_eq!(seen, [2, 4, 6]);
    }
}
