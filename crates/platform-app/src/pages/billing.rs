//! Billing page. Every action here runs through the financial approval workflow.

use std::sync::Arc;

use platform_action::{
    ActionCategory, ActionDefinition, ActionError, ActionParameter, ActionResult,
    ControllerMetadata, PageController, ParameterType, Params, ValidationRule,
};
use platform_core::types::ActionContext;
use serde_json::{json, Map};

use super::{str_param, ObjectStore};

pub const INVOICE_CLASS: &str = "Invoice";

fn create_invoice(store: Arc<ObjectStore>) -> ActionDefinition {
    ActionDefinition::new(
        "createInvoice",
        "Create Invoice",
        "Issue an invoice to a customer",
        ActionCategory::Data,
    )
    .permission("billing:write")
    .parameter(
        ActionParameter::new("customerId", ParameterType::String, "Customer to bill").required(),
    )
    .parameter(
        ActionParameter::new("amount", ParameterType::Number, "Invoice total")
            .required()
            .with_rule(ValidationRule::range(Some(0.01), None, "amount must be positive"))
            .with_example(250),
    )
    .parameter(
        ActionParameter::new("currency", ParameterType::String, "ISO currency code")
            .with_rule(ValidationRule::one_of(
                ["USD", "EUR", "GBP"],
                "currency must be one of USD, EUR, GBP",
            ))
            .with_default("USD"),
    )
    .tags(["billing", "invoice", "finance"])
    .example(
        "Bill customer c-42 for 250 dollars",
        json!({"customerId": "c-42", "amount": 250}),
    )
    .handler(move |params: Params, ctx: ActionContext| {
        let store = Arc::clone(&store);
        async move {
            let customer_id = str_param(&params, "customerId")?;
            let currency = str_param(&params, "currency")?;
            let amount = params.get("amount").cloned().unwrap_or_default();

            let mut fields = Map::new();
            fields.insert("customerId".to_string(), json!(customer_id));
            fields.insert("amount".to_string(), amount);
            fields.insert("currency".to_string(), json!(currency));
            fields.insert("issuedBy".to_string(), json!(ctx.user.user_id));
            let invoice = store.create(INVOICE_CLASS, fields);

            Ok::<_, ActionError>(ActionResult::ok_with_message(
                invoice,
                format!("Invoice issued to {}", customer_id),
            ))
        }
    })
}

pub fn controller(store: Arc<ObjectStore>) -> PageController {
    PageController::new("billing", "Billing", "Invoices and payments")
        .with_metadata(ControllerMetadata {
            category: "billing".to_string(),
            tags: vec!["billing".to_string(), "finance".to_string()],
            permissions: vec!["billing:read".to_string()],
            version: "1.0.0".to_string(),
        })
        .with_action(create_invoice(store))
}
