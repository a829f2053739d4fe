//! A reference `Instance`: a first-order linear recurrence
//! `y' = a*y + b*u`, stepped with explicit Euler. Used by `cosim-slave`'s
//! and `cosim-master`'s integration tests as a stand-in for "some real
//! simulation unit" — the coordination layer above never knows the
//! difference.

use crate::error::ModelError;
use crate::instance::{Instance, SlaveType};
use cosim_proto::model::{
    Causality, DataType, SlaveTypeDescription, TimeDuration, TimePoint, VariableDescription, VariableId, Variability,
};

pub const VAR_Y: VariableId = VariableId(0);
pub const VAR_U: VariableId = VariableId(1);
pub const VAR_A: VariableId = VariableId(2);
pub const VAR_B: VariableId = VariableId(3);

pub struct LinearIntegrator {
    description: SlaveTypeDescription,
    y: f64,
    u: f64,
    a: f64,
    b: f64,
}

impl LinearIntegrator {
    pub fn new(initial_y: f64, a: f64, b: f64) -> LinearIntegrator {
        LinearIntegrator {
            description: type_description(),
            y: initial_y,
            u: 0.0,
            a,
            b,
        }
    }
}

pub fn type_description() -> SlaveTypeDescription {
    SlaveTypeDescription {
        name: "linear_integrator".to_string(),
        uuid: "6f6b7b9e-6e0e-4f9c-9a0e-9f6b7e6b7b9e".to_string(),
        description: "y' = a*y + b*u, explicit Euler".to_string(),
        author: "".to_string(),
        version: "1.0".to_string(),
        variables: vec![
            VariableDescription {
                id: VAR_Y,
                name: "y".to_string(),
                data_type: DataType::Real,
                causality: Causality::Output,
                variability: Variability::Continuous,
            },
            VariableDescription {
                id: VAR_U,
                name: "u".to_string(),
                data_type: DataType::Real,
                causality: Causality::Input,
                variability: Variability::Continuous,
            },
            VariableDescription {
                id: VAR_A,
                name: "a".to_string(),
                data_type: DataType::Real,
                causality: Causality::Parameter,
                variability: Variability::Tunable,
            },
            VariableDescription {
                id: VAR_B,
                name: "b".to_string(),
                data_type: DataType::Real,
                causality: Causality::Parameter,
                variability: Variability::Tunable,
            },
        ],
    }
}

impl Instance for LinearIntegrator {
    fn type_description(&self) -> &SlaveTypeDescription {
        &self.description
    }

    fn setup(
        &mut self,
        _slave_name: &str,
        _execution_name: &str,
        _start_t: TimePoint,
        _stop_t: TimePoint,
        _adaptive_step: bool,
        _relative_tolerance: f64,
    ) -> Result<(), ModelError> {
        Ok(())
    }

    fn start_simulation(&mut self) -> Result<(), ModelError> {
        Ok(())
    }

    fn end_simulation(&mut self) -> Result<(), ModelError> {
        Ok(())
    }

    fn do_step(&mut self, _current_t: TimePoint, step_size: TimeDuration) -> bool {
        let dy = self.a * self.y + self.b * self.u;
        let next = self.y + step_size * dy;
        if !next.is_finite() {
            return false;
        }
        self.y = next;
        true
    }

    fn get_real(&self, id: VariableId) -> Result<f64, ModelError> {
        match id {
            VAR_Y => Ok(self.y),
            VAR_U => Ok(self.u),
            VAR_A => Ok(self.a),
            VAR_B => Ok(self.b),
            other => Err(ModelError::UnknownVariable(other)),
        }
    }

    fn set_real(&mut self, id: VariableId, value: f64) -> Result<(), ModelError> {
        match id {
            VAR_Y => {
                self.y = value;
                Ok(())
            }
            VAR_U => {
                self.u = value;
                Ok(())
            }
            VAR_A => {
                self.a = value;
                Ok(())
            }
            VAR_B => {
                self.b = value;
                Ok(())
            }
            other => Err(ModelError::UnknownVariable(other)),
        }
    }

    fn get_integer(&self, id: VariableId) -> Result<i32, ModelError> {
        Err(ModelError::WrongType(id))
    }

    fn set_integer(&mut self, id: VariableId, _value: i32) -> Result<(), ModelError> {
        Err(ModelError::WrongType(id))
    }

    fn get_boolean(&self, id: VariableId) -> Result<bool, ModelError> {
        Err(ModelError::WrongType(id))
    }

    fn set_boolean(&mut self, id: VariableId, _value: bool) -> Result<(), ModelError> {
        Err(ModelError::WrongType(id))
    }

    fn get_string(&self, id: VariableId) -> Result<String, ModelError> {
        Err(ModelError::WrongType(id))
    }

    fn set_string(&mut self, id: VariableId, _value: String) -> Result<(), ModelError> {
        Err(ModelError::WrongType(id))
    }
}

/// Factory consumed by the slave-provider directory. Each provider entry
/// owns one `(initial_y, a, b)` triple, matching the "one factory per
/// configured type" shape of `neutronium`'s listener registration.
pub struct LinearIntegratorType {
    description: SlaveTypeDescription,
    initial_y: f64,
    a: f64,
    b: f64,
}

impl LinearIntegratorType {
    pub fn new(initial_y: f64, a: f64, b: f64) -> LinearIntegratorType {
        LinearIntegratorType {
            description: type_description(),
            initial_y,
            a,
            b,
        }
    }
}

impl SlaveType for LinearIntegratorType {
    fn description(&self) -> &SlaveTypeDescription {
        &self.description
    }

    fn instantiate(&self) -> Result<Box<dyn Instance>, String> {
        Ok(Box::new(LinearIntegrator::new(self.initial_y, self.a, self.b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decays_toward_zero_with_negative_a() {
        let mut integrator = LinearIntegrator::new(1.0, -1.0, 0.0);
        for _ in 0..1000 {
            assert!(integrator.do_step(0.0, 0.001));
        }
        assert!(integrator.get_real(VAR_Y).unwrap() < 0.5);
    }

    #[test]
    fn rejects_step_that_produces_non_finite_state() {
        let mut integrator = LinearIntegrator::new(1.0, 1.0, 0.0);
        assert!(!integrator.do_step(0.0, f64::MAX));
    }

    #[test]
    fn input_is_settable_and_readable() {
        let mut integrator = LinearIntegrator::new(0.0, 0.0, 2.0);
        integrator.set_real(VAR_U, 3.0).unwrap();
        assert_eq!(integrator.get_real(VAR_U).unwrap(), 3.0);
        integrator.do_step(0.0, 0.5);
        assert_eq!(integrator.get_real(VAR_Y).unwrap(), 3.0);
    }
}
