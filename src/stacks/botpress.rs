//! Botpress on containers: the reference stack.
//!
//! A VPC, a generated database secret, a PostgreSQL cluster, a Redis cache
//! with its own security and subnet groups, a container cluster, the Botpress
//! task definition and service, and a load balancer in front of it. The
//! service is granted access to the database and to the cache.

use tracing::info;

use crate::config::Parameters;
use crate::error::Result;
use crate::model::{NodeHandle, Permission, Properties, ResourceKind, Stack, Value};

/// Stack name.
pub const NAME: &str = "botpress";

/// Public domain the server is reached at.
pub const DOMAIN_NAME: &str = "DOMAIN_NAME";

/// Botpress Pro license key.
pub const LICENSE_KEY: &str = "BP_LICENSE_KEY";

/// Parameters that must be set before the stack can be declared.
pub const REQUIRED_PARAMETERS: [&str; 2] = [DOMAIN_NAME, LICENSE_KEY];

const DB_NAME: &str = "botpressdb";
const DB_USERNAME: &str = "clusteradmin";
const SECRET_KEY: &str = "password";
const SECRET_LENGTH: u32 = 30;
const IMAGE: &str = "botpress/server:v12_2_3";
const CONTAINER_PORT: u16 = 3000;
const DESIRED_COUNT: u32 = 2;
const GRACE_PERIOD_SECS: u32 = 7 * 60;
const LOG_RETENTION_DAYS: u32 = 7;

const STARTUP_SCRIPT: &str = concat!(
    "echo \"starting container\" && mkdir -p /botpress/embeddings",
    " && wget -P /botpress/embeddings -q -nc https://nyc3.digitaloceanspaces.com/botpress-public/embeddings/bp.en.100.bin",
    " && wget -P /botpress/embeddings -q -nc https://nyc3.digitaloceanspaces.com/botpress-public/embeddings/bp.en.bpe.model",
    " ; ./duckling & ./bp lang --langDir /botpress/embeddings & ./bp",
);

fn props<const N: usize>(entries: [(&str, Value); N]) -> Properties {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn endpoint_list(url: &str) -> Value {
    Value::json(Value::list([Value::object([("endpoint", url)])]))
}

/// Declares the Botpress stack.
///
/// # Errors
///
/// Returns `MissingConfiguration` if `DOMAIN_NAME` or `BP_LICENSE_KEY` is
/// absent, before any resource is declared.
pub fn define(parameters: &Parameters) -> Result<Stack> {
    parameters.require(REQUIRED_PARAMETERS)?;
    let domain = parameters.get_required(DOMAIN_NAME)?.to_string();
    let license = parameters.get_required(LICENSE_KEY)?.to_string();

    let mut stack = Stack::new(NAME, parameters.clone());

    let vpc = stack.declare(
        ResourceKind::Network,
        "vpc",
        props([("cidr", Value::from("10.0.0.0/16"))]),
    )?;

    let secret = stack.declare(
        ResourceKind::Secret,
        "db-secret",
        props([
            ("password_length", Value::from(SECRET_LENGTH)),
            ("secret_string_template", Value::from("{}")),
            ("generate_key", Value::from(SECRET_KEY)),
            ("exclude_characters", Value::from("\"@/\\")),
            ("exclude_punctuation", Value::from(true)),
        ]),
    )?;
    let password = || Value::from(secret.deferred("secret_string").json_field(SECRET_KEY));

    let database = stack.declare(
        ResourceKind::DatabaseCluster,
        "database",
        props([
            ("engine", Value::from("aurora-postgresql")),
            ("default_database_name", Value::from(DB_NAME)),
            ("instances", Value::from(1u32)),
            ("master_username", Value::from(DB_USERNAME)),
            ("master_password", password()),
            ("instance_type", Value::from("burstable3.medium")),
            ("parameter_group_name", Value::from("default.aurora-postgresql10")),
            ("removal_policy", Value::from("destroy")),
            ("vpc_id", vpc.output("vpc_id")),
            ("subnet_ids", vpc.output("private_subnet_ids")),
        ]),
    )?;

    let redis_sg = stack.declare(
        ResourceKind::SecurityGroup,
        "redis-security-group",
        props([("vpc_id", vpc.output("vpc_id"))]),
    )?;

    let redis_subnets = stack.declare(
        ResourceKind::SubnetGroup,
        "redis-subnet-group",
        props([
            ("description", Value::from("")),
            ("subnet_ids", vpc.output("private_subnet_ids")),
        ]),
    )?;

    let redis = stack.declare(
        ResourceKind::CacheCluster,
        "redis",
        props([
            ("cache_node_type", Value::from("cache.m5.large")),
            ("engine", Value::from("redis")),
            ("num_cache_nodes", Value::from(1u32)),
            ("vpc_security_group_ids", Value::list([redis_sg.output("security_group_id")])),
            ("cache_subnet_group_name", redis_subnets.output("name")),
        ]),
    )?;

    let cluster = stack.declare(
        ResourceKind::ContainerCluster,
        "ecs-cluster",
        props([("vpc_id", vpc.output("vpc_id"))]),
    )?;

    let task = declare_task(&mut stack, &domain, &license, &database, &redis, password())?;

    let service = stack.declare(
        ResourceKind::ContainerService,
        "service",
        props([
            ("cluster_arn", cluster.output("cluster_arn")),
            ("task_definition_arn", task.output("task_definition_arn")),
            ("desired_count", Value::from(DESIRED_COUNT)),
            ("health_check_grace_period_secs", Value::from(GRACE_PERIOD_SECS)),
            ("vpc_id", vpc.output("vpc_id")),
            ("subnet_ids", vpc.output("private_subnet_ids")),
        ]),
    )?;

    stack.declare(
        ResourceKind::LoadBalancer,
        "load-balancer",
        props([
            ("vpc_id", vpc.output("vpc_id")),
            ("subnet_ids", vpc.output("public_subnet_ids")),
            ("target_service", service.output("service_name")),
            ("container_port", Value::from(CONTAINER_PORT)),
            ("health_check", Value::object([("path", "/admin/")])),
            ("target_group_attributes", Value::object([("stickiness.enabled", "true")])),
        ]),
    )?;

    stack.allow_from(&database, &service, Permission::all_traffic());
    stack.allow_from(&redis_sg, &service, Permission::all_traffic());

    info!("Declared Botpress stack for {domain} ({} resources)", stack.len());
    Ok(stack)
}

fn declare_task(
    stack: &mut Stack,
    domain: &str,
    license: &str,
    database: &NodeHandle,
    redis: &NodeHandle,
    password: Value,
) -> Result<NodeHandle> {
    let environment = Value::object([
        (
            "DATABASE_URL",
            Value::interpolate([
                Value::from(format!("postgres://{DB_USERNAME}:")),
                password,
                Value::from("@"),
                database.output("socket_address"),
                Value::from(format!("/{DB_NAME}")),
            ]),
        ),
        ("BPFS_STORAGE", Value::from("database")),
        (
            "REDIS_URL",
            Value::interpolate([
                Value::from("redis://"),
                redis.output("endpoint_address"),
                Value::from(":"),
                redis.output("endpoint_port"),
            ]),
        ),
        ("PRO_ENABLED", Value::from("true")),
        ("BP_LICENSE_KEY", Value::from(license)),
        ("CLUSTER_ENABLED", Value::from("true")),
        ("AUTO_MIGRATE", Value::from("true")),
        ("BP_MODULE_NLU_LANGUAGESOURCES", endpoint_list("http://localhost:3100")),
        ("BP_MODULE_NLU_DUCKLINGURL", endpoint_list("http://localhost:8000")),
        ("EXTERNAL_URL", Value::from(format!("https://{domain}"))),
        ("BP_PRODUCTION", Value::from("true")),
    ]);

    let container = Value::object([
        ("name", Value::from("botpress")),
        ("image", Value::from(IMAGE)),
        ("command", Value::list(["/bin/bash", "-c", STARTUP_SCRIPT])),
        ("environment", environment),
        ("port_mappings", Value::list([Value::object([("container_port", CONTAINER_PORT)])])),
        (
            "logging",
            Value::object([
                ("driver", Value::from("awslogs")),
                ("stream_prefix", Value::from("botpress")),
                ("retention_days", Value::from(LOG_RETENTION_DAYS)),
            ]),
        ),
    ]);

    stack.declare(
        ResourceKind::TaskDefinition,
        "task-definition",
        props([
            ("memory_limit_mib", Value::from(3072u32)),
            ("cpu", Value::from(512u32)),
            ("containers", Value::list([container])),
        ]),
    )
}
