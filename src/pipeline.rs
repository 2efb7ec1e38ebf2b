// src/pipeline.rs

//! The streaming data processing pipeline shipped with streamdag.
//!
//! ```text
//! run_spark -> create_new_topic -> { topic_created | topic_already_exists }
//!           -> { run_data_generator, spark_write_to_es, spark_write_to_minio }
//! ```
//!
//! `Streamdag.toml` at the repository root declares the same graph.

use std::time::Duration;

use crate::config::{ConfigFile, DagBuilder, DagSpec, DecisionConfig, DefaultArgs, TaskOverrides};
use crate::config::parse_start_date;
use crate::errors::Result;
use crate::schedule::Schedule;
use crate::types::{OverlapBehaviour, TaskAction, TriggerPolicy};

pub const DAG_ID: &str = "streaming_data_processing_dag";

pub const RUN_SPARK: &str = "run_spark";
pub const CREATE_NEW_TOPIC: &str = "create_new_topic";
pub const TOPIC_CREATED: &str = "topic_created";
pub const TOPIC_ALREADY_EXISTS: &str = "topic_already_exists";
pub const RUN_DATA_GENERATOR: &str = "run_data_generator";
pub const SPARK_WRITE_TO_ES: &str = "spark_write_to_es";
pub const SPARK_WRITE_TO_MINIO: &str = "spark_write_to_minio";

/// Sink jobs fed by whichever topic branch ran.
pub const SINKS: [&str; 3] = [RUN_DATA_GENERATOR, SPARK_WRITE_TO_ES, SPARK_WRITE_TO_MINIO];

pub const TOPIC: &str = "streaming_data";
pub const KAFKA_BOOTSTRAP: &str = "localhost:9092";

pub fn dag_spec() -> Result<DagSpec> {
    Ok(DagSpec {
        id: DAG_ID.to_string(),
        owner: "train".to_string(),
        schedule: Schedule::Daily,
        catchup: false,
        start_date: parse_start_date("2024-09-16T12:20:00")?,
        overlap: OverlapBehaviour::Queue,
        max_queued_runs: 1,
    })
}

pub fn default_args() -> DefaultArgs {
    DefaultArgs {
        retries: 1,
        retry_delay: Duration::from_secs(5),
        execution_timeout: None,
    }
}

/// Decision used by `create_new_topic`: make sure the Kafka topic exists.
pub fn ensure_topic_decision() -> DecisionConfig {
    DecisionConfig::EnsureTopic {
        topic: TOPIC.to_string(),
        exists_cmd: format!("kafka-topics.sh --bootstrap-server {KAFKA_BOOTSTRAP} --describe --topic {{topic}}"),
        create_cmd: format!("kafka-topics.sh --bootstrap-server {KAFKA_BOOTSTRAP} --create --topic {{topic}}"),
        when_created: TOPIC_CREATED.to_string(),
        when_exists: TOPIC_ALREADY_EXISTS.to_string(),
    }
}

/// Build the validated pipeline graph.
pub fn streaming_data_processing_dag() -> Result<ConfigFile> {
    let mut b = DagBuilder::new(dag_spec()?, default_args());

    let sink = TaskOverrides::default()
        .execution_timeout(Duration::from_secs(15 * 60))
        .trigger_policy(TriggerPolicy::NoneFailedMinOneSuccess);

    b.task(
        RUN_SPARK,
        TaskAction::shell(". .venv/bin/activate && python read_and_write_initial_data/read_and_write_spark.py"),
        TaskOverrides::default()
            .retries(2)
            .retry_delay(Duration::from_secs(15))
            .execution_timeout(Duration::from_secs(20 * 60)),
    )?
    .task(CREATE_NEW_TOPIC, TaskAction::branch(CREATE_NEW_TOPIC), TaskOverrides::default())?
    .task(TOPIC_CREATED, TaskAction::Empty, TaskOverrides::default())?
    .task(TOPIC_ALREADY_EXISTS, TaskAction::Empty, TaskOverrides::default())?
    .task(RUN_DATA_GENERATOR, TaskAction::shell("bash_script/data_generator.sh"), sink)?
    .task(SPARK_WRITE_TO_ES, TaskAction::shell("bash_script/spark_to_elasticsearch.sh"), sink)?
    .task(SPARK_WRITE_TO_MINIO, TaskAction::shell("bash_script/spark_to_minio.sh"), sink)?
    .decision(CREATE_NEW_TOPIC, ensure_topic_decision())?;

    b.edge(RUN_SPARK, CREATE_NEW_TOPIC)
        .edge(CREATE_NEW_TOPIC, [TOPIC_CREATED, TOPIC_ALREADY_EXISTS])
        .edge([TOPIC_CREATED, TOPIC_ALREADY_EXISTS], SINKS);

    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::DagGraph;

    #[test]
    fn pipeline_shape() {
        let cfg = streaming_data_processing_dag().unwrap();
        let graph = DagGraph::from_config(&cfg);

        assert_eq!(graph.roots(), vec![RUN_SPARK]);
        assert_eq!(
            graph.dependents_of(CREATE_NEW_TOPIC).to_vec(),
            vec![TOPIC_ALREADY_EXISTS.to_string(), TOPIC_CREATED.to_string()]
        );
        for sink in SINKS {
            assert_eq!(
                graph.dependencies_of(sink).to_vec(),
                vec![TOPIC_ALREADY_EXISTS.to_string(), TOPIC_CREATED.to_string()]
            );
        }
    }

    #[test]
    fn pipeline_task_policies() {
        let cfg = streaming_data_processing_dag().unwrap();

        let spark = &cfg.task[RUN_SPARK];
        assert_eq!(spark.max_attempts(), 3);
        assert_eq!(spark.retry_delay, Duration::from_secs(15));
        assert_eq!(spark.execution_timeout, Some(Duration::from_secs(1200)));

        let topic = &cfg.task[CREATE_NEW_TOPIC];
        assert_eq!(topic.retries, 1);
        assert_eq!(topic.retry_delay, Duration::from_secs(5));
        assert_eq!(topic.trigger_policy, TriggerPolicy::AllSucceeded);

        for sink in SINKS {
            let spec = &cfg.task[sink];
            assert_eq!(spec.trigger_policy, TriggerPolicy::NoneFailedMinOneSuccess);
            assert_eq!(spec.execution_timeout, Some(Duration::from_secs(900)));
        }

        assert_eq!(cfg.dag.owner, "train");
        assert!(!cfg.dag.catchup);
    }
}
