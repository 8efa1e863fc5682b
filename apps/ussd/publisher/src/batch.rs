//! Input decoding: one application object or an array of them.

use domain_loan_applications::InboundMessage;

/// Decode and validate a JSON document into the messages to publish.
pub fn parse_batch(input: &str) -> Result<Vec<InboundMessage>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(input)?;
    // Untagged enums would hide the validation message
    if value.is_array() {
        serde_json::from_value::<Vec<InboundMessage>>(value)
    } else {
        serde_json::from_value::<InboundMessage>(value).map(|message| vec![message])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APPLICATION: &str = r#"{
        "messageId": "msg-1",
        "referenceNumber": "REF-1",
        "loanApplicationUssdId": 7,
        "fullName": "Jane Banda",
        "nationalId": "123456/10/1",
        "phoneNumber": "+260971234567",
        "loanProductId": 3,
        "loanProductName": "Salary Advance",
        "principalAmount": 1500.0,
        "loanTermMonths": 6,
        "payoutMethod": 1,
        "mobileMoneyProvider": "MTN",
        "mobileMoneyNumber": "+260961111111",
        "queuedAt": "2026-01-15T08:30:00Z"
    }"#;

    #[test]
    fn test_single_object() {
        let messages = parse_batch(APPLICATION).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id, "msg-1");
        assert_eq!(messages[0].loan_product_id, "3");
    }

    #[test]
    fn test_array() {
        let second = APPLICATION.replace("msg-1", "msg-2");
        let input = format!("[{APPLICATION}, {second}]");

        let messages = parse_batch(&input).unwrap();

        let ids: Vec<_> = messages.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, ["msg-1", "msg-2"]);
    }

    #[test]
    fn test_invalid_application_is_reported() {
        let input = APPLICATION.replace("1500.0", "0.0");
        let err = parse_batch(&input).unwrap_err();
        assert!(err.to_string().contains("invalid message"));
    }

    #[test]
    fn test_not_json() {
        assert!(parse_batch("loan please").is_err());
    }
}
