//! Modelo de Vehicle
//!
//! Un vehículo pertenece a exactamente un customer (referencia, no propiedad).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Vehicle principal - mapea exactamente a la tabla vehicles
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Vehicle {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub vin: Option<String>,
    pub plate: Option<String>,
    pub year: Option<i32>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub engine_size: Option<String>,
    pub engine_code: Option<String>,
    pub mileage: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Datos para registrar un vehículo
#[derive(Debug, Clone, Default)]
pub struct NewVehicle {
    pub customer_id: Uuid,
    pub vin: Option<String>,
    pub plate: Option<String>,
    pub year: Option<i32>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub engine_size: Option<String>,
    pub engine_code: Option<String>,
    pub mileage: Option<i32>,
}

impl NewVehicle {
    pub fn into_vehicle(self, now: DateTime<Utc>) -> Vehicle {
        Vehicle {
            id: Uuid::new_v4(),
            customer_id: self.customer_id,
            vin: self.vin,
            plate: self.plate,
            year: self.year,
            make: self.make,
            model: self.model,
            engine_size: self.engine_size,
            engine_code: self.engine_code,
            mileage: self.mileage,
            created_at: now,
            updated_at: now,
        }
    }
}
