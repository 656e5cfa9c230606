//! Invoice record schema shared by prompt rendering and response parsing.

use serde::{Deserialize, Serialize};

/// Structured invoice fields extracted from a document.
///
/// Every scalar is a string and defaults to `""` when the source text does
/// not contain it, so a serialized record always carries every key. Unknown
/// keys are rejected on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct InvoiceRecord {
    /// Invoice number ("Invoice #", "Invoice No").
    pub invoice_id: String,

    /// Issue date ("Date", "Date of Issue").
    pub date_of_issue: String,

    /// Customer name and address ("Bill To").
    pub billing_to: String,

    /// Issuer name and address ("From" or the company name).
    pub billing_from: String,

    /// Line items, in the order the model reported them.
    pub units: Vec<UnitEntry>,

    /// Total quantity, rarely printed on invoices.
    pub total_quantity: String,

    /// Subtotal before VAT and shipping.
    pub total_gross_value: String,

    /// Discount applied to the total.
    pub total_discount: String,

    /// Net amount after discounts, before VAT and shipping.
    pub total_net_value: String,

    /// VAT or sales tax amount.
    pub total_vat_amount: String,

    /// Final amount including all charges.
    pub total_amount: String,

    /// Shipping or freight charge.
    pub total_shipping_charge: String,
}

/// A single line item on the invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct UnitEntry {
    /// Name or description of the product or service.
    pub unit_name: String,

    /// Price per unit.
    pub unit_price: String,

    /// Quantity of the unit.
    pub unit_quantity: String,
}

/// Extraction guidance for one output key.
#[derive(Debug, Clone, Copy)]
pub struct FieldGuide {
    /// Serialized key name.
    pub key: &'static str,
    /// What the field means and how it is usually labeled.
    pub description: &'static str,
}

/// Field semantics and label aliases, keyed by serialized field name.
///
/// Must list exactly the keys of [`InvoiceRecord`]; the prompt renders this
/// table verbatim.
pub const FIELD_GUIDE: &[FieldGuide] = &[
    FieldGuide {
        key: "totalDiscount",
        description: "Any discounts applied to the total amount. This is often labeled as \"Discount\" or \"Total Discount\". If no discount is present, return an empty string.",
    },
    FieldGuide {
        key: "totalGrossValue",
        description: "The subtotal or gross amount before any additional charges like VAT or shipping. This is often labeled as \"Sub Total\", \"Gross Total\", or similar.",
    },
    FieldGuide {
        key: "totalAmount",
        description: "The final total amount, often labeled as or near \"Total\", \"Total Amount\", or similar. This is the final figure that includes all charges.",
    },
    FieldGuide {
        key: "totalNetValue",
        description: "The net amount after applying any discounts but before adding VAT and shipping. This is often labeled as \"Net Total\" or \"Net Amount\". If no discounts are applied, it might be the same as the gross value.",
    },
    FieldGuide {
        key: "totalQuantity",
        description: "Total quantity is usually not directly listed on the invoice; return an empty string for this field.",
    },
    FieldGuide {
        key: "totalShippingCharge",
        description: "The cost of shipping or freight. It might be labeled as \"Shipping\", \"Shipping Charges\", or \"Freight\".",
    },
    FieldGuide {
        key: "totalVatAmount",
        description: "The VAT or tax amount. This is often labeled as \"VAT\", \"Sales Tax\", or similar.",
    },
    FieldGuide {
        key: "invoiceId",
        description: "The unique ID of the invoice, often labeled as \"Invoice #\" or \"Invoice No\".",
    },
    FieldGuide {
        key: "dateOfIssue",
        description: "The date when the invoice was issued, often labeled as \"Date\" or \"Date of Issue\".",
    },
    FieldGuide {
        key: "billingTo",
        description: "The name and address of the customer being billed, often labeled as \"Bill To\".",
    },
    FieldGuide {
        key: "billingFrom",
        description: "The name and address of the company issuing the invoice, often labeled as \"From\" or the company name.",
    },
    FieldGuide {
        key: "units",
        description: "A list of all units/services provided. Use an empty list when none are present. Each unit should include:\n    - unitName: The name or description of the service or product.\n    - unitPrice: The price per unit.\n    - unitQuantity: The quantity of the unit/service.",
    },
];

impl InvoiceRecord {
    /// A record showing the output shape, with one empty unit entry so the
    /// nesting of `units` is visible.
    pub fn schema_skeleton() -> Self {
        Self {
            units: vec![UnitEntry::default()],
            ..Self::default()
        }
    }

    /// Serialized key names in declaration order.
    pub fn field_names() -> Vec<&'static str> {
        vec![
            "invoiceId",
            "dateOfIssue",
            "billingTo",
            "billingFrom",
            "units",
            "totalQuantity",
            "totalGrossValue",
            "totalDiscount",
            "totalNetValue",
            "totalVatAmount",
            "totalAmount",
            "totalShippingCharge",
        ]
    }

    /// Check whether nothing was found in the source text.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// An uploaded image together with the name it was submitted under.
#[derive(Debug, Clone)]
pub struct RawDocument {
    filename: String,
    bytes: Vec<u8>,
}

impl RawDocument {
    /// Wrap image bytes and their original filename.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Original filename as submitted.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Raw image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
