//! pseudo-parameters: built-in references resolved by fixed rules
use crate::value::Value;

pub const REGION: &str = "AWS::Region";
pub const PARTITION: &str = "AWS::Partition";
pub const ACCOUNT_ID: &str = "AWS::AccountId";
pub const STACK_NAME: &str = "AWS::StackName";
pub const STACK_ID: &str = "AWS::StackId";
pub const NOTIFICATION_ARNS: &str = "AWS::NotificationARNs";
pub const URL_SUFFIX: &str = "AWS::URLSuffix";
pub const NO_VALUE: &str = super::intrinsic::NO_VALUE;

const EXAMPLE_ACCOUNT_ID: &str = "123456789012";
const EXAMPLE_STACK_NAME: &str = "teststack";
const EXAMPLE_STACK_UUID: &str = "51af3dc0-da77-11e4-872e-1234567db123";

/// Partition a region belongs to
pub fn partition(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "aws-cn"
    } else if region.starts_with("us-gov-") {
        "aws-us-gov"
    } else {
        "aws"
    }
}

pub fn url_suffix(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "amazonaws.com.cn"
    } else {
        "amazonaws.com"
    }
}

/// Value of the pseudo-parameter `name` when analysing for `region`
///
/// `AWS::NoValue` resolves to [Value::Null].
pub fn resolve(name: &str, region: &str) -> Option<Value> {
    let partition = partition(region);

    Some(match name {
        REGION => region.into(),
        PARTITION => partition.into(),
        ACCOUNT_ID => EXAMPLE_ACCOUNT_ID.into(),
        STACK_NAME => EXAMPLE_STACK_NAME.into(),
        STACK_ID => format!(
            "arn:{partition}:cloudformation:{region}:{EXAMPLE_ACCOUNT_ID}:stack/{EXAMPLE_STACK_NAME}/{EXAMPLE_STACK_UUID}"
        )
        .into(),
        NOTIFICATION_ARNS => Value::Array(vec![format!(
            "arn:{partition}:sns:{region}:{EXAMPLE_ACCOUNT_ID}:notification"
        )
        .into()]),
        URL_SUFFIX => url_suffix(region).into(),
        NO_VALUE => Value::Null,
        _ => return None,
    })
}
