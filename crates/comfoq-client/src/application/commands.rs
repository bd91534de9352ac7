//! Command dispatch: turns a command name into an RMI request and reads the
//! gateway's acknowledgement.

use comfoq_core::protocol::{Body, CnRmiRequest, Message, OperationType, ResultCode};
use comfoq_core::{Command, UnknownCommand};

use crate::application::error::SessionError;

/// A validated command ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCommand {
    pub command: Command,
    pub body: Body,
}

/// Stateless translator between command names and RMI messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Resolves `name` and builds the RMI body addressed to node `group`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownCommand`] if `name` matches no command.  Nothing is
    /// sent in that case.
    pub fn prepare(&self, group: u32, name: &str) -> Result<PreparedCommand, UnknownCommand> {
        let command: Command = name.parse()?;
        Ok(PreparedCommand {
            command,
            body: Body::CnRmiRequest(CnRmiRequest {
                node_id: group,
                message: command.payload().to_vec(),
            }),
        })
    }

    /// Checks an RMI response.  A non-OK operation result or a non-zero RMI
    /// result both count as a rejection.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] on rejection.
    pub fn interpret_ack(&self, reply: &Message) -> Result<(), SessionError> {
        let kind = OperationType::CnRmiRequest;
        if reply.result() != ResultCode::Ok {
            return Err(SessionError::Rejected {
                kind,
                result: reply.result(),
            });
        }
        if let Body::CnRmiResponse(resp) = &reply.body {
            if resp.result.unwrap_or(0) != 0 {
                return Err(SessionError::Rejected {
                    kind,
                    result: ResultCode::RmiError,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comfoq_core::protocol::{CnRmiResponse, Operation};
    use uuid::Uuid;

    fn ack(result: ResultCode, rmi_result: Option<u32>) -> Message {
        Message {
            src: Uuid::nil(),
            dst: Uuid::nil(),
            operation: Operation::reply(Some(4), result),
            body: Body::CnRmiResponse(CnRmiResponse {
                result: rmi_result,
                message: None,
            }),
        }
    }

    #[test]
    fn test_prepare_builds_rmi_for_group() {
        // Arrange
        let dispatcher = CommandDispatcher;

        // Act
        let prepared = dispatcher.prepare(1, "fanModeLow").unwrap();

        // Assert
        assert_eq!(prepared.command, Command::FanModeLow);
        assert_eq!(
            prepared.body,
            Body::CnRmiRequest(CnRmiRequest {
                node_id: 1,
                message: Command::FanModeLow.payload().to_vec(),
            })
        );
    }

    #[test]
    fn test_prepare_unknown_name() {
        let err = CommandDispatcher.prepare(1, "makeCoffee").unwrap_err();
        assert_eq!(err, UnknownCommand("makeCoffee".to_string()));
    }

    #[test]
    fn test_interpret_ack_ok() {
        assert_eq!(CommandDispatcher.interpret_ack(&ack(ResultCode::Ok, None)), Ok(()));
        assert_eq!(CommandDispatcher.interpret_ack(&ack(ResultCode::Ok, Some(0))), Ok(()));
    }

    #[test]
    fn test_interpret_ack_rejections() {
        assert_eq!(
            CommandDispatcher.interpret_ack(&ack(ResultCode::NotReachable, None)),
            Err(SessionError::Rejected {
                kind: OperationType::CnRmiRequest,
                result: ResultCode::NotReachable
            })
        );
        assert_eq!(
            CommandDispatcher.interpret_ack(&ack(ResultCode::Ok, Some(11))),
            Err(SessionError::Rejected {
                kind: OperationType::CnRmiRequest,
                result: ResultCode::RmiError
            })
        );
    }
}
