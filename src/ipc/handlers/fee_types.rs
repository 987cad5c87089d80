use rusqlite::{params, OptionalExtension, Row};
use serde_json::json;

use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{get_i64, get_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{FeeFrequency, FeeType, NewFeeType};

const FEE_TYPE_COLUMNS: &str =
    "id, name, description, amount, frequency, applicable, is_optional, applied_date";

fn fee_type_from_row(row: &Row) -> rusqlite::Result<FeeType> {
    let frequency: String = row.get(4)?;
    let applicable: String = row.get(5)?;
    let is_optional: i64 = row.get(6)?;
    Ok(FeeType {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        amount: row.get(3)?,
        frequency: FeeFrequency::parse(&frequency).unwrap_or(FeeFrequency::OneTime),
        applicable: serde_json::from_str(&applicable).unwrap_or_default(),
        is_optional: is_optional != 0,
        applied_date: row.get(7)?,
    })
}

fn list_fee_types(state: &AppState) -> anyhow::Result<Vec<FeeType>> {
    let mut stmt = state
        .ledger
        .prepare(&format!("SELECT {} FROM fee_types ORDER BY id", FEE_TYPE_COLUMNS))?;
    let fee_types = stmt
        .query_map([], fee_type_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(fee_types)
}

/// Monthly/annual sums over the non-optional fees, plus the derived yearly
/// figure (monthly × 12 + annual). One-time fees are charged outside the
/// recurring cycle and stay out of all three.
fn totals(fee_types: &[FeeType], class_name: Option<&str>) -> (i64, i64, i64) {
    let relevant: Vec<&FeeType> = fee_types
        .iter()
        .filter(|f| !f.is_optional)
        .filter(|f| match class_name {
            Some(class) => f.applicable.iter().any(|c| c == class),
            None => true,
        })
        .collect();
    let monthly: i64 = relevant
        .iter()
        .filter(|f| f.frequency == FeeFrequency::Monthly)
        .map(|f| f.amount)
        .sum();
    let annual: i64 = relevant
        .iter()
        .filter(|f| f.frequency == FeeFrequency::Annual)
        .map(|f| f.amount)
        .sum();
    (monthly, annual, monthly * 12 + annual)
}

fn handle_fee_types_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    match list_fee_types(state) {
        Ok(fee_types) => ok(&req.id, json!({ "feeTypes": fee_types })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_fee_types_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(fee_type_id) = get_i64(&req.params, "feeTypeId") else {
        return err(&req.id, "bad_params", "missing feeTypeId", None);
    };
    let row = state
        .ledger
        .query_row(
            &format!("SELECT {} FROM fee_types WHERE id = ?", FEE_TYPE_COLUMNS),
            [fee_type_id],
            fee_type_from_row,
        )
        .optional();
    match row {
        Ok(Some(fee_type)) => ok(&req.id, json!({ "feeType": fee_type })),
        Ok(None) => err(&req.id, "not_found", "fee type not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_fee_types_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let new: NewFeeType = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let name = new.name.trim().to_string();
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let applicable = match serde_json::to_string(&new.applicable) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "internal", e.to_string(), None),
    };

    if let Err(e) = state.ledger.execute(
        "INSERT INTO fee_types(
           name, description, amount, frequency, applicable, is_optional, applied_date
         ) VALUES(?, ?, ?, ?, ?, ?, ?)",
        params![
            name,
            new.description,
            new.amount,
            new.frequency.as_str(),
            applicable,
            new.is_optional as i64,
            new.applied_date,
        ],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    let fee_type = FeeType {
        id: state.ledger.last_insert_rowid(),
        name,
        description: new.description,
        amount: new.amount,
        frequency: new.frequency,
        applicable: new.applicable,
        is_optional: new.is_optional,
        applied_date: new.applied_date,
    };
    ok(&req.id, json!({ "feeType": fee_type }))
}

fn handle_fee_types_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("feeType") else {
        return err(&req.id, "bad_params", "missing feeType", None);
    };
    let fee_type: FeeType = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let applicable = match serde_json::to_string(&fee_type.applicable) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "internal", e.to_string(), None),
    };

    let changed = state.ledger.execute(
        "UPDATE fee_types SET
           name = ?, description = ?, amount = ?, frequency = ?,
           applicable = ?, is_optional = ?, applied_date = ?
         WHERE id = ?",
        params![
            fee_type.name,
            fee_type.description,
            fee_type.amount,
            fee_type.frequency.as_str(),
            applicable,
            fee_type.is_optional as i64,
            fee_type.applied_date,
            fee_type.id,
        ],
    );
    match changed {
        Ok(0) => err(&req.id, "not_found", "fee type not found", None),
        Ok(_) => ok(&req.id, json!({ "feeType": fee_type })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_fee_types_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(fee_type_id) = get_i64(&req.params, "feeTypeId") else {
        return err(&req.id, "bad_params", "missing feeTypeId", None);
    };
    match state
        .ledger
        .execute("DELETE FROM fee_types WHERE id = ?", [fee_type_id])
    {
        Ok(0) => err(&req.id, "not_found", "fee type not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_fee_types_for_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(class_name) = get_str(&req.params, "className") else {
        return err(&req.id, "bad_params", "missing className", None);
    };
    match list_fee_types(state) {
        Ok(fee_types) => {
            let applicable: Vec<FeeType> = fee_types
                .into_iter()
                .filter(|f| f.applicable.iter().any(|c| c == class_name))
                .collect();
            ok(&req.id, json!({ "feeTypes": applicable }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_fee_types_totals(state: &mut AppState, req: &Request) -> serde_json::Value {
    match list_fee_types(state) {
        Ok(fee_types) => {
            let (monthly, annual, yearly) = totals(&fee_types, None);
            ok(
                &req.id,
                json!({ "monthly": monthly, "annual": annual, "yearly": yearly }),
            )
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_fee_types_class_totals(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(class_name) = get_str(&req.params, "className") else {
        return err(&req.id, "bad_params", "missing className", None);
    };
    match list_fee_types(state) {
        Ok(fee_types) => {
            let (monthly, annual, yearly) = totals(&fee_types, Some(class_name));
            ok(
                &req.id,
                json!({ "monthly": monthly, "annual": annual, "yearly": yearly }),
            )
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Per-class fee structure upsert, mirrored to whichever backend is active.
fn handle_fee_structure_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(class_name) = get_str(&req.params, "className") else {
        return err(&req.id, "bad_params", "missing className", None);
    };
    let Some(monthly_fee) = get_i64(&req.params, "monthlyFee") else {
        return err(&req.id, "bad_params", "missing monthlyFee", None);
    };
    let Some(admission_fee) = get_i64(&req.params, "admissionFee") else {
        return err(&req.id, "bad_params", "missing admissionFee", None);
    };

    match state
        .store
        .upsert_fee_structure(class_name, monthly_fee, admission_fee)
    {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, "feeStructure.update", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "feeTypes.list" => Some(handle_fee_types_list(state, req)),
        "feeTypes.get" => Some(handle_fee_types_get(state, req)),
        "feeTypes.create" => Some(handle_fee_types_create(state, req)),
        "feeTypes.update" => Some(handle_fee_types_update(state, req)),
        "feeTypes.delete" => Some(handle_fee_types_delete(state, req)),
        "feeTypes.forClass" => Some(handle_fee_types_for_class(state, req)),
        "feeTypes.totals" => Some(handle_fee_types_totals(state, req)),
        "feeTypes.classTotals" => Some(handle_fee_types_class_totals(state, req)),
        "feeStructure.update" => Some(handle_fee_structure_update(state, req)),
        _ => None,
    }
}
